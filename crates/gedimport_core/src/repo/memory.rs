//! In-memory store and audit sink for tests and dry runs.
//!
//! Writes and deletes are staged per transaction and only become visible on
//! commit, so rollback semantics match the SQLite adapter.

use crate::model::draft::{
    ChildLinkDraft, CitationDraft, DatasetId, EntityDraft, EntityKind, EventDraft, FamilyDraft,
    LocalId, MediaDraft, PersonDraft, SourceDraft,
};
use crate::model::run::{ImportRun, RunId};
use crate::repo::import_store::{ensure_dataset, ImportStore, StoreError, StoreResult};
use crate::repo::run_repo::{ImportAuditSink, RunQueryResult};
use std::collections::BTreeMap;

type EntityKey = (DatasetId, EntityKind, LocalId);

#[derive(Debug)]
struct Staged {
    dataset_id: DatasetId,
    /// `None` marks a staged delete.
    writes: BTreeMap<EntityKey, Option<EntityDraft>>,
}

/// Transactional in-memory [`ImportStore`].
#[derive(Debug, Default)]
pub struct MemoryImportStore {
    committed: BTreeMap<EntityKey, EntityDraft>,
    staged: Option<Staged>,
    fail_on: Option<EntityKind>,
}

impl MemoryImportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert of `kind` fail, for exercising storage-error paths.
    pub fn failing_on(kind: EntityKind) -> Self {
        Self {
            fail_on: Some(kind),
            ..Self::default()
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// Committed rows of `kind` in `dataset_id`.
    pub fn count(&self, dataset_id: &DatasetId, kind: EntityKind) -> usize {
        self.committed
            .keys()
            .filter(|(dataset, entity_kind, _)| dataset == dataset_id && *entity_kind == kind)
            .count()
    }

    /// Committed draft for `(dataset_id, kind, local_id)`.
    pub fn get(
        &self,
        dataset_id: &DatasetId,
        kind: EntityKind,
        local_id: &str,
    ) -> Option<&EntityDraft> {
        self.committed
            .get(&(dataset_id.clone(), kind, LocalId::new(local_id)))
    }

    pub fn persons(&self, dataset_id: &DatasetId) -> Vec<&PersonDraft> {
        self.committed
            .iter()
            .filter(|((dataset, _, _), _)| dataset == dataset_id)
            .filter_map(|(_, draft)| match draft {
                EntityDraft::Person(person) => Some(person),
                _ => None,
            })
            .collect()
    }

    pub fn child_links(&self, dataset_id: &DatasetId) -> Vec<&ChildLinkDraft> {
        self.committed
            .iter()
            .filter(|((dataset, _, _), _)| dataset == dataset_id)
            .filter_map(|(_, draft)| match draft {
                EntityDraft::ChildLink(link) => Some(link),
                _ => None,
            })
            .collect()
    }

    fn stage<'a>(
        &mut self,
        kind: EntityKind,
        drafts: impl IntoIterator<Item = (&'a DatasetId, EntityDraft)>,
    ) -> StoreResult<()> {
        if self.fail_on == Some(kind) {
            return Err(StoreError::InvalidData(format!(
                "injected failure writing {}",
                kind.as_str()
            )));
        }
        let staged = self.staged.as_mut().ok_or(StoreError::NotInTransaction)?;

        for (dataset_id, draft) in drafts {
            ensure_dataset(&staged.dataset_id, dataset_id)?;
            let key = (dataset_id.clone(), kind, draft.local_id().clone());
            let previous = match staged.writes.get(&key) {
                Some(entry) => entry.as_ref(),
                None => self.committed.get(&key),
            };
            let merged = match (draft, previous) {
                (EntityDraft::ChildLink(mut link), Some(EntityDraft::ChildLink(previous))) => {
                    link.pedigree = link.pedigree.or(previous.pedigree);
                    link.sequence = link.sequence.or(previous.sequence);
                    EntityDraft::ChildLink(link)
                }
                (draft, _) => draft,
            };
            staged.writes.insert(key, Some(merged));
        }
        Ok(())
    }
}

impl ImportStore for MemoryImportStore {
    fn begin(&mut self, dataset_id: &DatasetId) -> StoreResult<()> {
        if self.staged.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.staged = Some(Staged {
            dataset_id: dataset_id.clone(),
            writes: BTreeMap::new(),
        });
        Ok(())
    }

    fn insert_persons(&mut self, drafts: &[PersonDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::Person,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::Person(d.clone()))),
        )
    }

    fn insert_families(&mut self, drafts: &[FamilyDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::Family,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::Family(d.clone()))),
        )
    }

    fn insert_child_links(&mut self, drafts: &[ChildLinkDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::ChildLink,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::ChildLink(d.clone()))),
        )
    }

    fn insert_events(&mut self, drafts: &[EventDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::Event,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::Event(d.clone()))),
        )
    }

    fn insert_sources(&mut self, drafts: &[SourceDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::Source,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::Source(d.clone()))),
        )
    }

    fn insert_citations(&mut self, drafts: &[CitationDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::Citation,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::Citation(d.clone()))),
        )
    }

    fn insert_media(&mut self, drafts: &[MediaDraft]) -> StoreResult<()> {
        self.stage(
            EntityKind::Media,
            drafts
                .iter()
                .map(|d| (&d.dataset_id, EntityDraft::Media(d.clone()))),
        )
    }

    fn delete_entities(&mut self, kind: EntityKind, local_ids: &[LocalId]) -> StoreResult<()> {
        let staged = self.staged.as_mut().ok_or(StoreError::NotInTransaction)?;
        for local_id in local_ids {
            let key = (staged.dataset_id.clone(), kind, local_id.clone());
            staged.writes.insert(key, None);
        }
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        let staged = self.staged.take().ok_or(StoreError::NotInTransaction)?;
        for (key, entry) in staged.writes {
            match entry {
                Some(draft) => {
                    self.committed.insert(key, draft);
                }
                None => {
                    self.committed.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.staged
            .take()
            .map(|_| ())
            .ok_or(StoreError::NotInTransaction)
    }
}

/// Audit sink keeping every saved snapshot in order.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    snapshots: Vec<ImportRun>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> &[ImportRun] {
        &self.snapshots
    }

    /// Most recent snapshot of `run_id`.
    pub fn latest(&self, run_id: RunId) -> Option<&ImportRun> {
        self.snapshots.iter().rev().find(|run| run.run_id == run_id)
    }
}

impl ImportAuditSink for MemoryAuditLog {
    fn save_run(&mut self, run: &ImportRun) -> RunQueryResult<()> {
        self.snapshots.push(run.clone());
        Ok(())
    }
}
