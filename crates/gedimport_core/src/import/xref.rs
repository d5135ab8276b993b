//! Cross-reference resolution for one import run.
//!
//! # Responsibility
//! - Map in-file cross-references to stable local identifiers.
//! - Track forward references until their defining record is declared.
//! - Report dangling references and kind mismatches at end of run.
//!
//! # Invariants
//! - One resolver per run and dataset; never shared across runs.
//! - Slots live in an arena indexed by first appearance.
//! - Every local id for an xref is issued here and is the same for the
//!   xref's whole lifetime, so re-imports land on the same rows.
//! - Re-declaring an xref keeps the last definition and is reported.

use crate::model::draft::{DatasetId, EntityKind, LocalId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Definition {
    kind: EntityKind,
    line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reference {
    expected: EntityKind,
    line: usize,
}

/// Position of an xref in the resolver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct XrefSlot(usize);

impl XrefSlot {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Slot {
    xref: String,
    local_id: LocalId,
    definition: Option<Definition>,
    /// References seen before the definition; drained on declare.
    pending: Vec<Reference>,
}

/// Outcome of declaring a defining record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub slot: XrefSlot,
    pub local_id: LocalId,
    /// Line of the earlier definition when this xref was already declared.
    pub duplicate_of: Option<usize>,
}

/// A reference whose target was never declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub xref: String,
    pub expected: EntityKind,
    /// Line of the first reference.
    pub line: usize,
    pub occurrences: usize,
}

/// A reference whose target was declared as a different entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMismatch {
    pub xref: String,
    pub expected: EntityKind,
    pub declared: EntityKind,
    pub line: usize,
}

/// End-of-run resolution summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub dangling: Vec<DanglingReference>,
    pub mismatches: Vec<KindMismatch>,
}

/// Per-run cross-reference table.
#[derive(Debug)]
pub struct XrefResolver {
    dataset_id: DatasetId,
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    mismatches: Vec<KindMismatch>,
}

impl XrefResolver {
    pub fn new(dataset_id: DatasetId) -> Self {
        Self {
            dataset_id,
            slots: Vec::new(),
            index: HashMap::new(),
            mismatches: Vec::new(),
        }
    }

    pub fn dataset_id(&self) -> &DatasetId {
        &self.dataset_id
    }

    /// Number of distinct cross-references seen so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Local id issued for `xref`.
    ///
    /// The tokenizer never lets `@` or whitespace into an xref, so ids
    /// composed with `@` as separator stay collision-free.
    pub fn issue_id(xref: &str) -> LocalId {
        LocalId::new(xref)
    }

    /// Arena slot of `xref`, if it has been seen.
    pub fn slot(&self, xref: &str) -> Option<XrefSlot> {
        self.index.get(xref).copied().map(XrefSlot)
    }

    /// Whether `xref` has a defining record.
    pub fn is_declared(&self, xref: &str) -> bool {
        self.index
            .get(xref)
            .and_then(|slot| self.slots.get(*slot))
            .is_some_and(|slot| slot.definition.is_some())
    }

    /// Records the defining site of `xref`.
    pub fn declare(&mut self, xref: &str, kind: EntityKind, line: usize) -> Declaration {
        let slot_index = self.slot_for(xref);
        let slot = &mut self.slots[slot_index];

        let duplicate_of = slot.definition.map(|previous| previous.line);
        slot.definition = Some(Definition { kind, line });

        for reference in slot.pending.drain(..) {
            if reference.expected != kind {
                self.mismatches.push(KindMismatch {
                    xref: slot.xref.clone(),
                    expected: reference.expected,
                    declared: kind,
                    line: reference.line,
                });
            }
        }

        Declaration {
            slot: XrefSlot(slot_index),
            local_id: slot.local_id.clone(),
            duplicate_of,
        }
    }

    /// Resolves a reference site, recording it as pending if undeclared.
    pub fn resolve(&mut self, xref: &str, expected: EntityKind, line: usize) -> LocalId {
        let slot_index = self.slot_for(xref);
        let slot = &mut self.slots[slot_index];

        match slot.definition {
            Some(definition) if definition.kind != expected => {
                self.mismatches.push(KindMismatch {
                    xref: slot.xref.clone(),
                    expected,
                    declared: definition.kind,
                    line,
                });
            }
            Some(_) => {}
            None => slot.pending.push(Reference { expected, line }),
        }

        slot.local_id.clone()
    }

    /// Closes the run's table and reports everything left unresolved.
    pub fn finish(self) -> ResolutionReport {
        let dangling = self
            .slots
            .into_iter()
            .filter(|slot| slot.definition.is_none())
            .filter_map(|slot| {
                let first = slot.pending.first().copied()?;
                Some(DanglingReference {
                    occurrences: slot.pending.len(),
                    xref: slot.xref,
                    expected: first.expected,
                    line: first.line,
                })
            })
            .collect();

        ResolutionReport {
            dangling,
            mismatches: self.mismatches,
        }
    }

    fn slot_for(&mut self, xref: &str) -> usize {
        if let Some(index) = self.index.get(xref) {
            return *index;
        }
        let index = self.slots.len();
        self.slots.push(Slot {
            xref: xref.to_string(),
            local_id: Self::issue_id(xref),
            definition: None,
            pending: Vec::new(),
        });
        self.index.insert(xref.to_string(), index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::XrefResolver;
    use crate::model::draft::{DatasetId, EntityKind};

    fn resolver() -> XrefResolver {
        XrefResolver::new(DatasetId::parse("tree").unwrap())
    }

    #[test]
    fn forward_reference_resolves_once_declared() {
        let mut resolver = resolver();
        let reference = resolver.resolve("I9", EntityKind::Person, 3);
        assert!(!resolver.is_declared("I9"));

        let declaration = resolver.declare("I9", EntityKind::Person, 10);
        assert_eq!(declaration.local_id, reference);
        assert_eq!(declaration.duplicate_of, None);

        let report = resolver.finish();
        assert!(report.dangling.is_empty());
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn undeclared_reference_is_dangling() {
        let mut resolver = resolver();
        resolver.resolve("F7", EntityKind::Family, 4);
        resolver.resolve("F7", EntityKind::Family, 9);
        let report = resolver.finish();
        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].xref, "F7");
        assert_eq!(report.dangling[0].line, 4);
        assert_eq!(report.dangling[0].occurrences, 2);
    }

    #[test]
    fn duplicate_declaration_reports_previous_line() {
        let mut resolver = resolver();
        resolver.declare("I1", EntityKind::Person, 1);
        let second = resolver.declare("I1", EntityKind::Person, 20);
        assert_eq!(second.duplicate_of, Some(1));
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn slots_follow_first_appearance_and_ids_stay_fixed() {
        let mut resolver = resolver();
        let family = resolver.resolve("F1", EntityKind::Family, 2);
        let person = resolver.declare("I1", EntityKind::Person, 5);
        let family_decl = resolver.declare("F1", EntityKind::Family, 9);

        assert_eq!(resolver.slot("F1").map(|slot| slot.index()), Some(0));
        assert_eq!(person.slot.index(), 1);
        assert_eq!(family_decl.slot.index(), 0);
        assert_eq!(family_decl.local_id, family);
        assert_eq!(family, XrefResolver::issue_id("F1"));
        assert!(resolver.slot("I404").is_none());
    }

    #[test]
    fn kind_mismatch_is_reported_before_and_after_declaration() {
        let mut resolver = resolver();
        resolver.resolve("X1", EntityKind::Family, 2);
        resolver.declare("X1", EntityKind::Person, 5);
        resolver.resolve("X1", EntityKind::Source, 8);

        let report = resolver.finish();
        assert!(report.dangling.is_empty());
        assert_eq!(report.mismatches.len(), 2);
        assert_eq!(report.mismatches[0].line, 2);
        assert_eq!(report.mismatches[0].declared, EntityKind::Person);
        assert_eq!(report.mismatches[1].expected, EntityKind::Source);
    }
}
