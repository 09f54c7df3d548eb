//! Per-load state of one cycle loader.

use crate::storage::EntityRelationStorage;
use entgraph_core::{AnyEntityRef, Entity, EntityRef, Key};
use std::collections::{HashMap, HashSet};

/// Pending storage of one relation, sources type-erased.
pub type RelationStorage<Id> = EntityRelationStorage<AnyEntityRef, Id>;

fn union_target_ids<Id: Key>(relations: &[(String, RelationStorage<Id>)]) -> Vec<Id> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for (_, storage) in relations {
        for id in storage.target_ids() {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Frozen pending relations, drained out of a [`CycleSessionContext`] before
/// the second phase starts.
#[derive(Debug)]
pub struct PendingSnapshot<Id> {
    relations: Vec<(String, RelationStorage<Id>)>,
}

impl<Id: Key> PendingSnapshot<Id> {
    /// Storage of one relation, if anything was recorded for it.
    pub fn storage(&self, relation: &str) -> Option<&RelationStorage<Id>> {
        self.relations
            .iter()
            .find(|(name, _)| name == relation)
            .map(|(_, storage)| storage)
    }

    /// Relation names with pending pairs, in first-recorded order.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|(name, _)| name.as_str())
    }

    /// Union of pending target ids over every relation, first-recorded order.
    pub fn target_ids(&self) -> Vec<Id> {
        union_target_ids(&self.relations)
    }

    /// Whether no relation recorded anything.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// State one loader keeps for the duration of a (possibly nested) load.
///
/// `storages` only holds what was recorded since the last drain. Drained
/// pairs wait in `frames`, one per select level, until that level resolves.
/// `resolved` accumulates every `T` seen by any pass of the load, and
/// `attempted` every id already selected, so nested passes skip both.
pub struct CycleSessionContext<T: Entity> {
    storages: Vec<(String, RelationStorage<T::Id>)>,
    frames: Vec<(usize, PendingSnapshot<T::Id>)>,
    resolved: HashMap<T::Id, EntityRef<T>>,
    attempted: HashSet<T::Id>,
}

impl<T: Entity> CycleSessionContext<T> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            storages: Vec::new(),
            frames: Vec::new(),
            resolved: HashMap::new(),
            attempted: HashSet::new(),
        }
    }

    /// The storage for `relation`, created on first use.
    pub fn storage_mut(&mut self, relation: &str) -> &mut RelationStorage<T::Id> {
        let slot = match self.storages.iter().position(|(name, _)| name == relation) {
            Some(slot) => slot,
            None => {
                self.storages
                    .push((relation.to_string(), EntityRelationStorage::new()));
                self.storages.len() - 1
            }
        };
        &mut self.storages[slot].1
    }

    /// The storage for `relation`, if anything was recorded.
    pub fn storage(&self, relation: &str) -> Option<&RelationStorage<T::Id>> {
        self.storages
            .iter()
            .find(|(name, _)| name == relation)
            .map(|(_, storage)| storage)
    }

    /// Union of pending target ids over every relation.
    pub fn all_pending_target_ids(&self) -> Vec<T::Id> {
        union_target_ids(&self.storages)
    }

    /// Move every pending storage out, leaving fresh ones for nested passes.
    pub fn take_pending(&mut self) -> PendingSnapshot<T::Id> {
        PendingSnapshot {
            relations: std::mem::take(&mut self.storages),
        }
    }

    /// Drain pending pairs into a frame owned by select level `depth`.
    pub fn push_frame(&mut self, depth: usize) {
        let snapshot = self.take_pending();
        self.frames.push((depth, snapshot));
    }

    /// Take the frame of level `depth`, if it is the innermost one.
    pub fn pop_frame(&mut self, depth: usize) -> Option<PendingSnapshot<T::Id>> {
        match self.frames.last() {
            Some((level, _)) if *level == depth => self.frames.pop().map(|(_, snapshot)| snapshot),
            _ => None,
        }
    }

    /// Drop the frames of level `depth` and deeper.
    pub fn discard_frames_from(&mut self, depth: usize) {
        self.frames.retain(|(level, _)| *level < depth);
    }

    /// Number of drained frames waiting to resolve.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Whether anything is pending.
    pub fn has_pending(&self) -> bool {
        self.storages.iter().any(|(_, storage)| !storage.is_empty())
    }

    /// Add loaded entities to the resolved set. An id already resolved keeps
    /// its first instance.
    pub fn remember<'a>(&mut self, entities: impl IntoIterator<Item = &'a EntityRef<T>>) {
        for entity in entities {
            self.resolved
                .entry(entity.id())
                .or_insert_with(|| entity.clone());
        }
    }

    /// Look up a resolved entity.
    pub fn resolved(&self, id: &T::Id) -> Option<&EntityRef<T>> {
        self.resolved.get(id)
    }

    /// Whether `id` is already resolved.
    pub fn is_resolved(&self, id: &T::Id) -> bool {
        self.resolved.contains_key(id)
    }

    /// Record that `ids` were selected, whether or not a row came back.
    pub fn mark_attempted<'a>(&mut self, ids: impl IntoIterator<Item = &'a T::Id>) {
        self.attempted.extend(ids.into_iter().cloned());
    }

    /// Whether `id` still has to be selected: neither resolved nor selected
    /// before in this load.
    pub fn needs_fetch(&self, id: &T::Id) -> bool {
        !self.resolved.contains_key(id) && !self.attempted.contains(id)
    }

    /// Number of resolved entities.
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }
}

impl<T: Entity> Default for CycleSessionContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> std::fmt::Debug for CycleSessionContext<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleSessionContext")
            .field("entity", &T::ENTITY_NAME)
            .field(
                "pending",
                &self
                    .storages
                    .iter()
                    .map(|(name, storage)| (name.as_str(), storage.pending_count()))
                    .collect::<Vec<_>>(),
            )
            .field("frames", &self.frames.len())
            .field("resolved", &self.resolved.len())
            .field("attempted", &self.attempted.len())
            .finish()
    }
}
