//! Result sets of keyed selection.

use entgraph_core::{Entity, EntityRef};
use std::collections::HashMap;

/// Insertion-ordered set of loaded entities, at most one per identifier.
pub struct LoadedSet<T: Entity> {
    entities: Vec<EntityRef<T>>,
    by_id: HashMap<T::Id, usize>,
}

impl<T: Entity> LoadedSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Insert `entity` under `id` unless that id is already present.
    ///
    /// Returns the instance now stored for `id`: the existing one if any.
    pub fn insert(&mut self, id: T::Id, entity: EntityRef<T>) -> EntityRef<T> {
        if let Some(&slot) = self.by_id.get(&id) {
            return self.entities[slot].clone();
        }
        self.by_id.insert(id, self.entities.len());
        self.entities.push(entity.clone());
        entity
    }

    /// Look up an entity by identifier.
    pub fn get(&self, id: &T::Id) -> Option<&EntityRef<T>> {
        self.by_id.get(id).map(|&slot| &self.entities[slot])
    }

    /// Whether an entity with this identifier is present.
    pub fn contains_id(&self, id: &T::Id) -> bool {
        self.by_id.contains_key(id)
    }

    /// Identifiers in insertion order.
    pub fn ids(&self) -> Vec<T::Id> {
        self.entities.iter().map(EntityRef::id).collect()
    }

    /// Iterate entities in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, EntityRef<T>> {
        self.entities.iter()
    }

    /// Number of distinct entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Consume into the ordered entity list.
    pub fn into_vec(self) -> Vec<EntityRef<T>> {
        self.entities
    }
}

impl<T: Entity> Default for LoadedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for LoadedSet<T> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
            by_id: self.by_id.clone(),
        }
    }
}

impl<T: Entity> std::fmt::Debug for LoadedSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSet")
            .field("entity", &T::ENTITY_NAME)
            .field("ids", &self.by_id.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a, T: Entity> IntoIterator for &'a LoadedSet<T> {
    type Item = &'a EntityRef<T>;
    type IntoIter = std::slice::Iter<'a, EntityRef<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
