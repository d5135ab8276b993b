//! Bounded per-kind draft buffer.

use crate::model::draft::{
    ChildLinkDraft, CitationDraft, EntityDraft, EventDraft, FamilyDraft, MediaDraft, PersonDraft,
    SourceDraft,
};
use crate::repo::import_store::{ImportStore, StoreResult};

/// Drafts of the records mapped since the last flush.
#[derive(Debug, Default)]
pub struct DraftBatch {
    persons: Vec<PersonDraft>,
    families: Vec<FamilyDraft>,
    child_links: Vec<ChildLinkDraft>,
    events: Vec<EventDraft>,
    sources: Vec<SourceDraft>,
    citations: Vec<CitationDraft>,
    media: Vec<MediaDraft>,
    records: usize,
}

impl DraftBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers all drafts of one mapped record.
    pub fn push_record(&mut self, drafts: impl IntoIterator<Item = EntityDraft>) {
        for draft in drafts {
            match draft {
                EntityDraft::Person(d) => self.persons.push(d),
                EntityDraft::Family(d) => self.families.push(d),
                EntityDraft::ChildLink(d) => self.child_links.push(d),
                EntityDraft::Event(d) => self.events.push(d),
                EntityDraft::Source(d) => self.sources.push(d),
                EntityDraft::Citation(d) => self.citations.push(d),
                EntityDraft::Media(d) => self.media.push(d),
            }
        }
        self.records += 1;
    }

    /// Records buffered since the last flush.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Bulk-inserts every buffered kind and empties the batch.
    ///
    /// Referenced kinds go first; the buffer is cleared even on error since
    /// the caller aborts the transaction anyway.
    pub fn flush<S: ImportStore + ?Sized>(&mut self, store: &mut S) -> StoreResult<()> {
        let result = self.write(store);
        self.clear();
        result
    }

    fn write<S: ImportStore + ?Sized>(&self, store: &mut S) -> StoreResult<()> {
        if !self.sources.is_empty() {
            store.insert_sources(&self.sources)?;
        }
        if !self.media.is_empty() {
            store.insert_media(&self.media)?;
        }
        if !self.persons.is_empty() {
            store.insert_persons(&self.persons)?;
        }
        if !self.families.is_empty() {
            store.insert_families(&self.families)?;
        }
        if !self.child_links.is_empty() {
            store.insert_child_links(&self.child_links)?;
        }
        if !self.events.is_empty() {
            store.insert_events(&self.events)?;
        }
        if !self.citations.is_empty() {
            store.insert_citations(&self.citations)?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.persons.clear();
        self.families.clear();
        self.child_links.clear();
        self.events.clear();
        self.sources.clear();
        self.citations.clear();
        self.media.clear();
        self.records = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::DraftBatch;
    use crate::model::draft::{DatasetId, EntityDraft, EntityKind, LocalId, SourceDraft};
    use crate::repo::import_store::ImportStore;
    use crate::repo::memory::MemoryImportStore;

    fn source(dataset: &DatasetId, id: &str) -> EntityDraft {
        EntityDraft::Source(SourceDraft {
            dataset_id: dataset.clone(),
            local_id: LocalId::new(id),
            title: Some("Parish register".to_string()),
            author: None,
            publication: None,
            abbreviation: None,
            text: None,
        })
    }

    #[test]
    fn flush_writes_and_empties() {
        let dataset = DatasetId::parse("tree").unwrap();
        let mut store = MemoryImportStore::new();
        let mut batch = DraftBatch::new();
        batch.push_record([source(&dataset, "S1")]);
        batch.push_record([source(&dataset, "S2")]);
        assert_eq!(batch.records(), 2);

        store.begin(&dataset).unwrap();
        batch.flush(&mut store).unwrap();
        store.commit().unwrap();

        assert!(batch.is_empty());
        assert_eq!(store.count(&dataset, EntityKind::Source), 2);
    }
}
