//! Storage port for imported entities and its SQLite adapter.
//!
//! # Responsibility
//! - Define the transactional write contract used by the import coordinator.
//! - Persist drafts as upserts keyed by `(dataset_id, local_id)`.
//!
//! # Invariants
//! - Every insert happens between `begin` and `commit`/`rollback`.
//! - Drafts must belong to the dataset passed to `begin`.
//! - Re-inserting a child link merges pedigree and sequence instead of
//!   clearing them.
//! - Deleting an id that was never written is not an error.

use crate::db::DbError;
use crate::model::draft::{
    ChildLinkDraft, CitationDraft, DatasetId, EntityKind, EventDraft, FamilyDraft, LocalId,
    MediaDraft, PersonDraft, Sex, SourceDraft,
};
use log::warn;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Insert, commit or rollback called without an open transaction.
    NotInTransaction,
    /// `begin` called while a transaction is already open.
    TransactionActive,
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotInTransaction => write!(f, "no import transaction is open"),
            Self::TransactionActive => write!(f, "an import transaction is already open"),
            Self::InvalidData(message) => write!(f, "invalid import data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotInTransaction | Self::TransactionActive | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Transactional sink for one dataset's drafts.
pub trait ImportStore {
    fn begin(&mut self, dataset_id: &DatasetId) -> StoreResult<()>;
    fn insert_persons(&mut self, drafts: &[PersonDraft]) -> StoreResult<()>;
    fn insert_families(&mut self, drafts: &[FamilyDraft]) -> StoreResult<()>;
    fn insert_child_links(&mut self, drafts: &[ChildLinkDraft]) -> StoreResult<()>;
    fn insert_events(&mut self, drafts: &[EventDraft]) -> StoreResult<()>;
    fn insert_sources(&mut self, drafts: &[SourceDraft]) -> StoreResult<()>;
    fn insert_citations(&mut self, drafts: &[CitationDraft]) -> StoreResult<()>;
    fn insert_media(&mut self, drafts: &[MediaDraft]) -> StoreResult<()>;
    /// Removes rows of `kind` written earlier in the open transaction or by
    /// a previous import.
    fn delete_entities(&mut self, kind: EntityKind, local_ids: &[LocalId]) -> StoreResult<()>;
    fn commit(&mut self) -> StoreResult<()>;
    fn rollback(&mut self) -> StoreResult<()>;
}

/// Rejects drafts scoped to a dataset other than the open transaction's.
pub(crate) fn ensure_dataset(active: &DatasetId, draft: &DatasetId) -> StoreResult<()> {
    if active == draft {
        return Ok(());
    }
    Err(StoreError::InvalidData(format!(
        "draft for dataset `{draft}` written inside transaction for `{active}`"
    )))
}

/// SQLite-backed entity store sharing a caller-owned connection.
pub struct SqliteImportStore<'conn> {
    conn: &'conn Connection,
    active: Option<DatasetId>,
}

impl<'conn> SqliteImportStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn, active: None }
    }

    fn active(&self) -> StoreResult<&DatasetId> {
        self.active.as_ref().ok_or(StoreError::NotInTransaction)
    }

    /// Number of stored rows of `kind` in `dataset_id`.
    pub fn count_entities(&self, dataset_id: &DatasetId, kind: EntityKind) -> StoreResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE dataset_id = ?1;",
            table_for(kind)
        );
        let count: i64 = self
            .conn
            .query_row(&sql, [dataset_id.as_str()], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| StoreError::InvalidData(format!("negative count {count}")))
    }

    /// Stored persons of `dataset_id`, ordered by local id.
    pub fn list_persons(&self, dataset_id: &DatasetId) -> StoreResult<Vec<PersonDraft>> {
        let mut stmt = self.conn.prepare(
            "SELECT dataset_id, local_id, name_display, given_names, surname, name_suffix, sex, note
             FROM persons
             WHERE dataset_id = ?1
             ORDER BY local_id ASC;",
        )?;
        let mut rows = stmt.query([dataset_id.as_str()])?;
        let mut persons = Vec::new();
        while let Some(row) = rows.next()? {
            persons.push(parse_person_row(row)?);
        }
        Ok(persons)
    }
}

impl ImportStore for SqliteImportStore<'_> {
    fn begin(&mut self, dataset_id: &DatasetId) -> StoreResult<()> {
        if self.active.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        self.active = Some(dataset_id.clone());
        Ok(())
    }

    fn insert_persons(&mut self, drafts: &[PersonDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO persons (
                dataset_id, local_id, name_display, given_names, surname, name_suffix, sex, note
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                name_display = excluded.name_display,
                given_names = excluded.given_names,
                surname = excluded.surname,
                name_suffix = excluded.name_suffix,
                sex = excluded.sex,
                note = excluded.note,
                imported_at = (strftime('%s', 'now') * 1000);",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.name_display.as_deref(),
                draft.given_names.as_deref(),
                draft.surname.as_deref(),
                draft.name_suffix.as_deref(),
                draft.sex.as_str(),
                draft.note.as_deref(),
            ])?;
        }
        Ok(())
    }

    fn insert_families(&mut self, drafts: &[FamilyDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO families (dataset_id, local_id, husband_id, wife_id, note)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                husband_id = excluded.husband_id,
                wife_id = excluded.wife_id,
                note = excluded.note,
                imported_at = (strftime('%s', 'now') * 1000);",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.husband.as_ref().map(LocalId::as_str),
                draft.wife.as_ref().map(LocalId::as_str),
                draft.note.as_deref(),
            ])?;
        }
        Ok(())
    }

    fn insert_child_links(&mut self, drafts: &[ChildLinkDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO child_links (dataset_id, local_id, family_id, child_id, pedigree, sequence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                pedigree = COALESCE(excluded.pedigree, child_links.pedigree),
                sequence = COALESCE(excluded.sequence, child_links.sequence);",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.family.as_str(),
                draft.child.as_str(),
                draft.pedigree.map(|pedigree| pedigree.as_str()),
                draft.sequence,
            ])?;
        }
        Ok(())
    }

    fn insert_events(&mut self, drafts: &[EventDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO events (
                dataset_id, local_id, owner_kind, owner_id, kind, event_type,
                event_date_original, event_date_display, event_date_sortable,
                event_date_precision, event_date_qualifier, event_date_end_year,
                event_date_valid, place, description
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                owner_kind = excluded.owner_kind,
                owner_id = excluded.owner_id,
                kind = excluded.kind,
                event_type = excluded.event_type,
                event_date_original = excluded.event_date_original,
                event_date_display = excluded.event_date_display,
                event_date_sortable = excluded.event_date_sortable,
                event_date_precision = excluded.event_date_precision,
                event_date_qualifier = excluded.event_date_qualifier,
                event_date_end_year = excluded.event_date_end_year,
                event_date_valid = excluded.event_date_valid,
                place = excluded.place,
                description = excluded.description;",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            let date = draft.date.as_ref();
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.owner.kind().as_str(),
                draft.owner.local_id().as_str(),
                draft.kind.as_str(),
                draft.event_type.as_deref(),
                date.map(|value| value.original.as_str()),
                date.map(|value| value.display()),
                date.and_then(|value| value.sortable_iso()),
                date.and_then(|value| value.precision).map(|p| p.as_str()),
                date.map(|value| value.qualifier.as_str()),
                date.and_then(|value| value.end_year),
                date.map(|value| i64::from(value.is_valid)),
                draft.place.as_deref(),
                draft.description.as_deref(),
            ])?;
        }
        Ok(())
    }

    fn insert_sources(&mut self, drafts: &[SourceDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO sources (dataset_id, local_id, title, author, publication, abbreviation, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                publication = excluded.publication,
                abbreviation = excluded.abbreviation,
                text = excluded.text;",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.title.as_deref(),
                draft.author.as_deref(),
                draft.publication.as_deref(),
                draft.abbreviation.as_deref(),
                draft.text.as_deref(),
            ])?;
        }
        Ok(())
    }

    fn insert_citations(&mut self, drafts: &[CitationDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO citations (dataset_id, local_id, source_id, owner_kind, owner_id, page, quality, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                source_id = excluded.source_id,
                owner_kind = excluded.owner_kind,
                owner_id = excluded.owner_id,
                page = excluded.page,
                quality = excluded.quality,
                text = excluded.text;",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.source.as_ref().map(LocalId::as_str),
                draft.owner.kind().as_str(),
                draft.owner.local_id().as_str(),
                draft.page.as_deref(),
                draft.quality,
                draft.text.as_deref(),
            ])?;
        }
        Ok(())
    }

    fn insert_media(&mut self, drafts: &[MediaDraft]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO media (dataset_id, local_id, file, format, title)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(dataset_id, local_id) DO UPDATE SET
                file = excluded.file,
                format = excluded.format,
                title = excluded.title;",
        )?;
        for draft in drafts {
            ensure_dataset(active, &draft.dataset_id)?;
            stmt.execute(params![
                draft.dataset_id.as_str(),
                draft.local_id.as_str(),
                draft.file.as_str(),
                draft.format.as_deref(),
                draft.title.as_deref(),
            ])?;
        }
        Ok(())
    }

    fn delete_entities(&mut self, kind: EntityKind, local_ids: &[LocalId]) -> StoreResult<()> {
        let active = self.active()?;
        let mut stmt = self.conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE dataset_id = ?1 AND local_id = ?2;",
            table_for(kind)
        ))?;
        for local_id in local_ids {
            stmt.execute(params![active.as_str(), local_id.as_str()])?;
        }
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.active()?;
        self.conn.execute_batch("COMMIT;")?;
        self.active = None;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.active()?;
        // The transaction is gone whether or not ROLLBACK reports an error.
        self.active = None;
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }
}

impl Drop for SqliteImportStore<'_> {
    fn drop(&mut self) {
        if let Some(dataset_id) = self.active.take() {
            warn!(
                "event=store_drop module=repo status=error dataset_id={dataset_id} error_code=open_transaction_rolled_back"
            );
            if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
                warn!("event=store_drop module=repo status=error error={err}");
            }
        }
    }
}

fn table_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Person => "persons",
        EntityKind::Family => "families",
        EntityKind::ChildLink => "child_links",
        EntityKind::Event => "events",
        EntityKind::Source => "sources",
        EntityKind::Citation => "citations",
        EntityKind::Media => "media",
    }
}

fn parse_person_row(row: &Row<'_>) -> StoreResult<PersonDraft> {
    let dataset_text: String = row.get(0)?;
    let dataset_id = DatasetId::parse(&dataset_text)
        .map_err(|err| StoreError::InvalidData(err.to_string()))?;
    let sex_text: String = row.get(6)?;
    let sex = Sex::parse(&sex_text)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown sex `{sex_text}`")))?;

    Ok(PersonDraft {
        dataset_id,
        local_id: LocalId::new(row.get::<_, String>(1)?),
        name_display: row.get(2)?,
        given_names: row.get(3)?,
        surname: row.get(4)?,
        name_suffix: row.get(5)?,
        sex,
        note: row.get(7)?,
    })
}
