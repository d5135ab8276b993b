//! Which drafts each top-level definition produced during one run.
//!
//! # Invariants
//! - A draft stays live while at least one current definition produces it.
//! - Redefining a record releases everything only its earlier definition
//!   produced; those keys are handed back for retraction.

use crate::model::draft::{EntityKind, LocalId};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

pub(crate) type DraftKey = (EntityKind, LocalId);

#[derive(Debug, Default)]
pub(crate) struct DefinitionLedger {
    dependents: HashMap<DraftKey, HashSet<DraftKey>>,
    producers: HashMap<DraftKey, usize>,
}

impl DefinitionLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Replaces `owner`'s dependents and returns the keys no definition
    /// produces anymore, sorted.
    pub(crate) fn define(
        &mut self,
        owner: DraftKey,
        dependents: HashSet<DraftKey>,
    ) -> Vec<DraftKey> {
        let previous = self.dependents.remove(&owner).unwrap_or_default();

        for key in dependents.difference(&previous) {
            *self.producers.entry(key.clone()).or_insert(0) += 1;
        }

        let mut released = Vec::new();
        for key in previous.difference(&dependents) {
            if let Entry::Occupied(mut producers) = self.producers.entry(key.clone()) {
                *producers.get_mut() -= 1;
                if *producers.get() == 0 {
                    producers.remove();
                    released.push(key.clone());
                }
            }
        }

        self.dependents.insert(owner, dependents);
        released.sort();
        released
    }
}
