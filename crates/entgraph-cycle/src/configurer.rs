//! Mapping-time wiring of cycle loaders.

use crate::fixer::RelationFixer;
use crate::loader::{CycleLoader, CycleLoaderKind, RelationBinding};
use crate::persister::EntityPersister;
use entgraph_core::{Entity, Error, Result};
use std::sync::Arc;

/// Collects the cyclic relations pointing at `T` while mappings are built,
/// then wires one [`CycleLoader`] into `T`'s persister. Relations of
/// different shapes share that loader.
///
/// Wiring must wait until every entity mapping is final: a relation is only
/// known to be cyclic once all types' relations are known.
///
/// ```ignore
/// let mut configurer = CycleConfigurer::<Person>::new(CycleLoaderKind::OneToOne);
/// configurer.register_relation::<Person, _>("Person.mentor", |p: &EntityRef<Person>, m: &EntityRef<Person>| {
///     p.write().mentor = Some(m.clone());
/// });
/// configurer.register_relation_as::<Person, _>(
///     "Person.mentees",
///     CycleLoaderKind::OneToMany,
///     |p: &EntityRef<Person>, m: &EntityRef<Person>| p.write().mentees.push(m.clone()),
/// );
/// let loader = configurer.wire_into(&person_persister)?;
/// ```
pub struct CycleConfigurer<T: Entity> {
    kind: CycleLoaderKind,
    bindings: Vec<RelationBinding<T>>,
    loader: Option<Arc<CycleLoader<T>>>,
}

impl<T: Entity> CycleConfigurer<T> {
    /// Create a configurer whose relations default to shape `kind`.
    pub fn new(kind: CycleLoaderKind) -> Self {
        Self {
            kind,
            bindings: Vec::new(),
            loader: None,
        }
    }

    /// Register `relation_name` from sources of type `S`, with the default
    /// shape.
    ///
    /// Registering a name twice keeps only the latest fixer.
    pub fn register_relation<S, F>(&mut self, relation_name: impl Into<String>, fixer: F) -> &mut Self
    where
        S: Send + Sync + 'static,
        F: RelationFixer<S, T> + 'static,
    {
        let kind = self.kind;
        self.register_relation_as::<S, F>(relation_name, kind, fixer)
    }

    /// Register `relation_name` from sources of type `S` with shape `kind`.
    pub fn register_relation_as<S, F>(
        &mut self,
        relation_name: impl Into<String>,
        kind: CycleLoaderKind,
        fixer: F,
    ) -> &mut Self
    where
        S: Send + Sync + 'static,
        F: RelationFixer<S, T> + 'static,
    {
        let binding = RelationBinding::new::<S, F>(relation_name, kind, fixer);
        if let Some(existing) = self
            .bindings
            .iter_mut()
            .find(|b| b.relation_name() == binding.relation_name())
        {
            tracing::warn!(
                entity = T::ENTITY_NAME,
                relation = binding.relation_name(),
                "Relation registered twice, replacing earlier fixer"
            );
            *existing = binding;
        } else {
            self.bindings.push(binding);
        }
        self
    }

    /// Number of registered relations.
    pub fn relation_count(&self) -> usize {
        self.bindings.len()
    }

    /// The wired loader, if [`wire_into`](Self::wire_into) has run.
    pub fn loader(&self) -> Option<&Arc<CycleLoader<T>>> {
        self.loader.as_ref()
    }

    /// Attach the loader to `persister` and bind every registered relation.
    ///
    /// The first call creates the loader and registers it as a post-load
    /// listener. Later calls register nothing new on the persister; they
    /// only bind relations registered since, and return the same loader.
    /// Wiring into a different persister is a configuration error.
    pub fn wire_into(&mut self, persister: &Arc<EntityPersister<T>>) -> Result<Arc<CycleLoader<T>>> {
        let loader = match &self.loader {
            Some(loader) => {
                if !loader.targets(persister) {
                    return Err(Error::config(format!(
                        "cycle loader for {} is already wired into another persister",
                        T::ENTITY_NAME
                    )));
                }
                Arc::clone(loader)
            }
            None => {
                let loader = Arc::new(CycleLoader::new(persister));
                self.loader = Some(Arc::clone(&loader));
                loader
            }
        };

        for binding in &self.bindings {
            loader.bind(binding.clone());
        }
        let attached = persister.add_post_load_listener(loader.clone());
        tracing::debug!(
            entity = T::ENTITY_NAME,
            persister = persister.name(),
            relations = self.bindings.len(),
            attached,
            "Cycle loader wired"
        );
        Ok(loader)
    }
}

impl<T: Entity> std::fmt::Debug for CycleConfigurer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleConfigurer")
            .field("entity", &T::ENTITY_NAME)
            .field("kind", &self.kind)
            .field("bindings", &self.bindings)
            .field("wired", &self.loader.is_some())
            .finish()
    }
}
