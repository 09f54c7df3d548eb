//! Identity-keyed pending relation storage.
//!
//! One [`EntityRelationStorage`] accumulates, for a single relation, which
//! target identifiers each source entity is still waiting for. Sources are
//! keyed by their [`EntityHandle`], so two sources with equal fields are still
//! tracked separately.
//!
//! Slots live in an arena in first-recorded order; the handle index only maps
//! into it. Iteration order is therefore deterministic.

use entgraph_core::{EntityHandle, Identity, Key};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct PendingSlot<S, Id> {
    source: S,
    targets: Vec<Id>,
}

/// Pending `(source, target id)` pairs of one relation.
#[derive(Debug, Clone)]
pub struct EntityRelationStorage<S, Id> {
    slots: Vec<PendingSlot<S, Id>>,
    index: HashMap<EntityHandle, usize>,
}

impl<S: Identity, Id: Key> EntityRelationStorage<S, Id> {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Record that `source` needs the target identified by `target_id`.
    ///
    /// Returns `false` if that exact pair was already pending.
    pub fn add_pending(&mut self, source: S, target_id: Id) -> bool {
        let handle = source.handle();
        let slot = match self.index.get(&handle) {
            Some(&slot) => slot,
            None => {
                self.index.insert(handle, self.slots.len());
                self.slots.push(PendingSlot {
                    source,
                    targets: Vec::new(),
                });
                self.slots.len() - 1
            }
        };

        let targets = &mut self.slots[slot].targets;
        if targets.contains(&target_id) {
            return false;
        }
        targets.push(target_id);
        true
    }

    /// Pending target ids of one source, in recording order.
    pub fn targets_of(&self, source: &impl Identity) -> Option<&[Id]> {
        self.index
            .get(&source.handle())
            .map(|&slot| self.slots[slot].targets.as_slice())
    }

    /// Iterate `(source, pending target ids)` in first-recorded order.
    pub fn iter(&self) -> impl Iterator<Item = (&S, &[Id])> {
        self.slots
            .iter()
            .map(|slot| (&slot.source, slot.targets.as_slice()))
    }

    /// Distinct target ids across all sources, in first-recorded order.
    pub fn target_ids(&self) -> Vec<Id> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in self.slots.iter().flat_map(|slot| slot.targets.iter()) {
            if seen.insert(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Number of distinct sources.
    pub fn source_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of pending pairs.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().map(|slot| slot.targets.len()).sum()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<S: Identity, Id: Key> Default for EntityRelationStorage<S, Id> {
    fn default() -> Self {
        Self::new()
    }
}
