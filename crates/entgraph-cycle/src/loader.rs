//! Two-phase cycle-resolving relation loader.
//!
//! A [`CycleLoader<T>`] is the post-load hook of `T`'s persister. While a
//! select of `T` reads its rows (first phase), row readers report each
//! `(source, target id)` pair of a relation pointing at `T` instead of joining
//! eagerly. Once the batch is read (second phase) the loader:
//!
//! 1. drains what was recorded into a frozen frame and adds the loaded roots
//!    to the load's resolved set (`on_batch_read`, before any listener of the
//!    persister resolves),
//! 2. computes the pending ids neither resolved nor selected before,
//! 3. selects those through the persister, which re-enters this loader for
//!    the fetched batch and resolves its own pending pairs first,
//! 4. applies every relation fixer whose target resolved,
//! 5. leaves the session level it entered in `before_select`.
//!
//! Step 5 runs on every exit path. Draining before recursing means a nested
//! pass never sees, and never clears, the outer pass's pairs; the resolved set
//! means it never re-fetches an entity an outer pass already holds.
//!
//! One loader per entity type handles all of its cyclic relations; the
//! traversal shape is a property of each relation.

use crate::context::PendingSnapshot;
use crate::fixer::RelationFixer;
use crate::listener::{RowReader, SelectListener};
use crate::persister::EntityPersister;
use crate::session::{LoadSession, LoaderId};
use entgraph_core::{
    AnyEntityRef, BoxFuture, Cx, Entity, EntityRef, Error, Outcome, Result, Row, TypeTag,
};
use entgraph_select::LoadedSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Traversal shape of one cyclic relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleLoaderKind {
    /// Each source has at most one target; recording also checks the
    /// source's runtime type against the relation's declared source type.
    OneToOne,
    /// A source may have many targets; the fixer accumulates.
    OneToMany,
    /// Like `OneToMany`, through a link table.
    ManyToMany,
}

impl CycleLoaderKind {
    /// Whether a source can receive more than one target.
    pub const fn is_to_many(self) -> bool {
        !matches!(self, CycleLoaderKind::OneToOne)
    }
}

type ErasedFixer<T> = Arc<dyn Fn(&AnyEntityRef, &EntityRef<T>) -> bool + Send + Sync>;

/// One cyclic relation pointing at `T`.
pub struct RelationBinding<T: Entity> {
    relation_name: String,
    kind: CycleLoaderKind,
    source_type: TypeTag,
    fixer: ErasedFixer<T>,
}

impl<T: Entity> RelationBinding<T> {
    /// Bind `relation_name` (e.g. `"Country.capital"`) of shape `kind` from
    /// sources of type `S` to `fixer`.
    pub fn new<S, F>(relation_name: impl Into<String>, kind: CycleLoaderKind, fixer: F) -> Self
    where
        S: Send + Sync + 'static,
        F: RelationFixer<S, T> + 'static,
    {
        Self {
            relation_name: relation_name.into(),
            kind,
            source_type: TypeTag::of::<S>(),
            fixer: Arc::new(move |source: &AnyEntityRef, target: &EntityRef<T>| {
                match source.downcast::<S>() {
                    Some(source) => {
                        fixer.apply(&source, target);
                        true
                    }
                    None => false,
                }
            }),
        }
    }

    /// Stable relation name.
    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    /// Traversal shape.
    pub fn kind(&self) -> CycleLoaderKind {
        self.kind
    }

    /// Declared source entity type.
    pub fn source_type(&self) -> TypeTag {
        self.source_type
    }

    fn apply(&self, source: &AnyEntityRef, target: &EntityRef<T>) -> bool {
        (self.fixer)(source, target)
    }
}

impl<T: Entity> Clone for RelationBinding<T> {
    fn clone(&self) -> Self {
        Self {
            relation_name: self.relation_name.clone(),
            kind: self.kind,
            source_type: self.source_type,
            fixer: Arc::clone(&self.fixer),
        }
    }
}

impl<T: Entity> std::fmt::Debug for RelationBinding<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationBinding")
            .field("relation", &self.relation_name)
            .field("kind", &self.kind)
            .field("source_type", &self.source_type.name())
            .finish()
    }
}

/// Loader counters since creation, across every load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Second-phase selects issued for missing targets.
    pub second_phase_selects: u64,
    /// Fixer applications.
    pub fixers_applied: u64,
    /// Pending ids that never resolved and were skipped.
    pub unresolved_skipped: u64,
}

#[derive(Debug, Default)]
struct LoaderCounters {
    second_phase_selects: AtomicU64,
    fixers_applied: AtomicU64,
    unresolved_skipped: AtomicU64,
}

/// Resolves the cyclic relations pointing at `T`.
pub struct CycleLoader<T: Entity> {
    id: LoaderId,
    target: Weak<EntityPersister<T>>,
    bindings: RwLock<Vec<RelationBinding<T>>>,
    counters: LoaderCounters,
}

impl<T: Entity> CycleLoader<T> {
    /// Create a loader resolving targets through `target`.
    ///
    /// The persister is held weakly: it owns the loader through its listener
    /// list once the loader is attached.
    pub fn new(target: &Arc<EntityPersister<T>>) -> Self {
        Self {
            id: LoaderId::next(),
            target: Arc::downgrade(target),
            bindings: RwLock::new(Vec::new()),
            counters: LoaderCounters::default(),
        }
    }

    /// Loader identity within sessions.
    pub fn id(&self) -> LoaderId {
        self.id
    }

    /// Whether this loader resolves through `persister`.
    pub fn targets(&self, persister: &Arc<EntityPersister<T>>) -> bool {
        std::ptr::eq(self.target.as_ptr(), Arc::as_ptr(persister))
    }

    /// Add a binding, replacing any binding with the same relation name.
    ///
    /// Returns `true` if a binding was replaced.
    pub fn bind(&self, binding: RelationBinding<T>) -> bool {
        let mut bindings = self.bindings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = bindings
            .iter_mut()
            .find(|b| b.relation_name == binding.relation_name)
        {
            *existing = binding;
            return true;
        }
        bindings.push(binding);
        false
    }

    /// Names of the bound relations, in binding order.
    pub fn relation_names(&self) -> Vec<String> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|b| b.relation_name.clone())
            .collect()
    }

    /// Counters since creation.
    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            second_phase_selects: self.counters.second_phase_selects.load(Ordering::Relaxed),
            fixers_applied: self.counters.fixers_applied.load(Ordering::Relaxed),
            unresolved_skipped: self.counters.unresolved_skipped.load(Ordering::Relaxed),
        }
    }

    /// Shape of the relation bound as `relation`.
    pub fn relation_kind(&self, relation: &str) -> Option<CycleLoaderKind> {
        self.binding_shape(relation).map(|(kind, _)| kind)
    }

    fn binding_shape(&self, relation: &str) -> Option<(CycleLoaderKind, TypeTag)> {
        self.bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|b| b.relation_name == relation)
            .map(|b| (b.kind, b.source_type))
    }

    /// Record that `source` needs the `T` identified by `target_id` through
    /// `relation`.
    ///
    /// Nothing is recorded when `target_id` is `None` (no related row), when
    /// no binding is named `relation`, or outside an active select of `T`.
    /// For one-to-one relations the declared source type must also
    /// match `S`, which tells apart several one-to-one relations sharing a
    /// foreign-key shape.
    pub fn on_first_phase_row_read<S: Send + Sync + 'static>(
        &self,
        session: &mut LoadSession,
        relation: &str,
        source: &EntityRef<S>,
        target_id: Option<T::Id>,
    ) {
        let Some(target_id) = target_id else {
            return;
        };
        let Some((kind, source_type)) = self.binding_shape(relation) else {
            tracing::debug!(entity = T::ENTITY_NAME, relation, "No binding for relation, ignoring row");
            return;
        };
        if kind == CycleLoaderKind::OneToOne && !source_type.is::<S>() {
            tracing::trace!(
                relation,
                declared = source_type.name(),
                actual = std::any::type_name::<S>(),
                "Source type does not match relation"
            );
            return;
        }
        let Some(context) = session.context_mut::<T>(self.id) else {
            tracing::debug!(entity = T::ENTITY_NAME, relation, "Row read outside an active select");
            return;
        };
        if context.storage_mut(relation).add_pending(source.erase(), target_id.clone()) {
            tracing::trace!(relation, source = std::any::type_name::<S>(), target = ?target_id, "Recorded pending relation");
        }
    }

    /// A row reader recording `relation` for `T` sources, reading the target
    /// id with `extract`.
    pub fn self_reference_reader<F>(self: &Arc<Self>, relation: impl Into<String>, extract: F) -> SelfReferenceReader<T>
    where
        F: Fn(&Row) -> Result<Option<T::Id>> + Send + Sync + 'static,
    {
        SelfReferenceReader {
            loader: Arc::clone(self),
            relation: relation.into(),
            extract: Arc::new(extract),
        }
    }

    async fn resolve(&self, cx: &Cx, session: &mut LoadSession, roots: &LoadedSet<T>) -> Outcome<(), Error> {
        let depth = session.depth_of(self.id);
        let Some(context) = session.context_mut::<T>(self.id) else {
            tracing::warn!(entity = T::ENTITY_NAME, "after_select without before_select");
            return Outcome::Ok(());
        };
        let snapshot = match context.pop_frame(depth) {
            Some(snapshot) => snapshot,
            None => {
                context.remember(roots.iter());
                context.take_pending()
            }
        };
        if snapshot.is_empty() {
            return Outcome::Ok(());
        }

        let missing: Vec<T::Id> = snapshot
            .target_ids()
            .into_iter()
            .filter(|id| context.needs_fetch(id))
            .collect();
        context.mark_attempted(&missing);

        if !missing.is_empty() {
            let Some(target) = self.target.upgrade() else {
                return Outcome::Err(Error::config(format!(
                    "persister for {} was dropped while its cycle loader is in use",
                    T::ENTITY_NAME
                )));
            };
            self.counters.second_phase_selects.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                entity = T::ENTITY_NAME,
                missing = missing.len(),
                depth,
                "Selecting missing cycle targets"
            );

            let fetched = match target.select(cx, session, &missing).await {
                Outcome::Ok(fetched) => fetched,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            if let Some(context) = session.context_mut::<T>(self.id) {
                context.remember(fetched.iter());
            }
        }

        self.apply_fixers(session, &snapshot);
        Outcome::Ok(())
    }

    fn apply_fixers(&self, session: &LoadSession, snapshot: &PendingSnapshot<T::Id>) {
        let Some(context) = session.context::<T>(self.id) else {
            return;
        };
        let bindings = self
            .bindings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut applied = 0_u64;
        let mut unresolved = 0_u64;
        for binding in &bindings {
            let Some(storage) = snapshot.storage(&binding.relation_name) else {
                continue;
            };
            for (source, target_ids) in storage.iter() {
                for id in target_ids {
                    let Some(target) = context.resolved(id) else {
                        unresolved += 1;
                        tracing::debug!(relation = %binding.relation_name, target = ?id, "Skipping unresolved reference");
                        continue;
                    };
                    if !binding.apply(source, target) {
                        tracing::trace!(relation = %binding.relation_name, "Source type mismatch, fixer skipped");
                        continue;
                    }
                    applied += 1;
                    if !binding.kind.is_to_many() {
                        break;
                    }
                }
            }
        }

        self.counters.fixers_applied.fetch_add(applied, Ordering::Relaxed);
        self.counters.unresolved_skipped.fetch_add(unresolved, Ordering::Relaxed);
        tracing::debug!(entity = T::ENTITY_NAME, applied, unresolved, "Cycle relations fixed");
    }

    fn release(&self, session: &mut LoadSession) {
        let level = session.depth_of(self.id);
        if let Some(context) = session.context_mut::<T>(self.id) {
            context.discard_frames_from(level);
        }
        let depth = session.leave(self.id);
        tracing::trace!(entity = T::ENTITY_NAME, depth, "Left cycle context");
    }
}

impl<T: Entity> SelectListener<T> for CycleLoader<T> {
    fn listener_id(&self) -> LoaderId {
        self.id
    }

    fn before_select(&self, session: &mut LoadSession, ids: &[T::Id]) {
        let depth = session.enter::<T>(self.id);
        tracing::debug!(entity = T::ENTITY_NAME, ids = ids.len(), depth, "Entered cycle context");
    }

    fn on_batch_read(&self, session: &mut LoadSession, roots: &LoadedSet<T>) {
        let depth = session.depth_of(self.id);
        if let Some(context) = session.context_mut::<T>(self.id) {
            context.remember(roots.iter());
            context.push_frame(depth);
        }
    }

    fn after_select<'a>(
        &'a self,
        cx: &'a Cx,
        session: &'a mut LoadSession,
        roots: &'a LoadedSet<T>,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(async move {
            let outcome = self.resolve(cx, session, roots).await;
            self.release(session);
            outcome
        })
    }

    fn on_select_error(&self, session: &mut LoadSession, ids: &[T::Id], error: &Error) {
        tracing::debug!(entity = T::ENTITY_NAME, ids = ids.len(), error = %error, "Select failed");
        self.release(session);
    }
}

impl<T: Entity> std::fmt::Debug for CycleLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleLoader")
            .field("id", &self.id)
            .field("entity", &T::ENTITY_NAME)
            .field("relations", &self.relation_names())
            .finish()
    }
}

/// Row reader for a relation from `T` back to `T`.
pub struct SelfReferenceReader<T: Entity> {
    loader: Arc<CycleLoader<T>>,
    relation: String,
    extract: Arc<dyn Fn(&Row) -> Result<Option<T::Id>> + Send + Sync>,
}

impl<T: Entity> RowReader<T> for SelfReferenceReader<T> {
    fn read_row(&self, session: &mut LoadSession, entity: &EntityRef<T>, row: &Row) -> Result<()> {
        let target_id = (self.extract)(row)?;
        self.loader
            .on_first_phase_row_read(session, &self.relation, entity, target_id);
        Ok(())
    }
}
