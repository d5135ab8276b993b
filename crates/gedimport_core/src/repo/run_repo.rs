//! Import run audit persistence.
//!
//! # Responsibility
//! - Persist `ImportRun` snapshots and their ordered error lists.
//! - Read runs back for reporting.
//!
//! # Invariants
//! - Saving is an upsert by `run_id`; the latest snapshot wins.
//! - Errors are append-only; positions are stable across snapshots.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::draft::{DatasetId, EntityKind};
use crate::model::run::{HeaderInfo, ImportError, ImportRun, RunId, RunStatus, Severity};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const RUN_SELECT_SQL: &str = "SELECT
    run_id,
    dataset_id,
    source_file,
    started_at,
    completed_at,
    status,
    counts_json,
    progress_percent,
    records_processed,
    records_skipped,
    header_json
FROM import_runs";

pub type RunQueryResult<T> = Result<T, RunQueryError>;

#[derive(Debug)]
pub enum RunQueryError {
    Db(DbError),
    Json(serde_json::Error),
    InvalidData(String),
}

impl Display for RunQueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "audit json: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted import run: {message}"),
        }
    }
}

impl Error for RunQueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RunQueryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RunQueryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RunQueryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Receives run snapshots at start, at progress intervals and at completion.
pub trait ImportAuditSink {
    fn save_run(&mut self, run: &ImportRun) -> RunQueryResult<()>;
}

/// SQLite-backed audit trail.
pub struct SqliteImportRunRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteImportRunRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get_run(&self, run_id: RunId) -> RunQueryResult<Option<ImportRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RUN_SELECT_SQL} WHERE run_id = ?1;"))?;
        let mut rows = stmt.query([run_id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let mut run = parse_run_row(row)?;
        run.errors = self.load_errors(run.run_id)?;
        Ok(Some(run))
    }

    /// Runs newest first, optionally restricted to one dataset.
    pub fn list_runs(&self, dataset_id: Option<&DatasetId>) -> RunQueryResult<Vec<ImportRun>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RUN_SELECT_SQL}
             WHERE (?1 IS NULL OR dataset_id = ?1)
             ORDER BY started_at DESC, run_id ASC;"
        ))?;
        let mut rows = stmt.query([dataset_id.map(DatasetId::as_str)])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            runs.push(parse_run_row(row)?);
        }
        for run in &mut runs {
            run.errors = self.load_errors(run.run_id)?;
        }
        Ok(runs)
    }

    fn load_errors(&self, run_id: RunId) -> RunQueryResult<Vec<ImportError>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT severity, code, message, line, record
             FROM import_errors
             WHERE run_id = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([run_id.to_string()])?;
        let mut errors = Vec::new();
        while let Some(row) = rows.next()? {
            let severity_text: String = row.get(0)?;
            let severity = Severity::parse(&severity_text).ok_or_else(|| {
                RunQueryError::InvalidData(format!("unknown severity `{severity_text}`"))
            })?;
            let line: Option<i64> = row.get(3)?;
            errors.push(ImportError {
                severity,
                code: row.get(1)?,
                message: row.get(2)?,
                line: line.map(to_usize).transpose()?,
                record: row.get(4)?,
            });
        }
        Ok(errors)
    }

    fn stored_error_count(&self, run_id: &str) -> RunQueryResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM import_errors WHERE run_id = ?1;",
            [run_id],
            |row| row.get(0),
        )?;
        to_usize(count)
    }
}

impl ImportAuditSink for SqliteImportRunRepository<'_> {
    fn save_run(&mut self, run: &ImportRun) -> RunQueryResult<()> {
        let run_id = run.run_id.to_string();
        let counts_json = serde_json::to_string(&run.counts)?;
        let header_json = run.header.as_ref().map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO import_runs (
                run_id, dataset_id, source_file, started_at, completed_at, status,
                counts_json, progress_percent, records_processed, records_skipped, header_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(run_id) DO UPDATE SET
                completed_at = excluded.completed_at,
                status = excluded.status,
                counts_json = excluded.counts_json,
                progress_percent = excluded.progress_percent,
                records_processed = excluded.records_processed,
                records_skipped = excluded.records_skipped,
                header_json = excluded.header_json;",
            params![
                run_id,
                run.dataset_id.as_str(),
                run.source_file.as_str(),
                run.started_at,
                run.completed_at,
                run.status.as_str(),
                counts_json,
                run.progress_percent,
                to_i64(run.records_processed)?,
                to_i64(run.records_skipped)?,
                header_json,
            ],
        )?;

        // Snapshots taken inside a rolled-back transaction may have lost
        // rows, so the tail is computed from what is actually stored.
        let stored = self.stored_error_count(&run_id)?;
        let mut insert = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO import_errors (run_id, position, severity, code, message, line, record)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        )?;
        for (position, error) in run.errors.iter().enumerate().skip(stored) {
            insert.execute(params![
                run_id,
                to_i64(position as u64)?,
                error.severity.as_str(),
                error.code.as_str(),
                error.message.as_str(),
                error.line.map(|line| to_i64(line as u64)).transpose()?,
                error.record.as_deref(),
            ])?;
        }
        Ok(())
    }
}

fn parse_run_row(row: &Row<'_>) -> RunQueryResult<ImportRun> {
    let run_id_text: String = row.get(0)?;
    let run_id = Uuid::parse_str(&run_id_text)
        .map_err(|err| RunQueryError::InvalidData(format!("run_id `{run_id_text}`: {err}")))?;
    let dataset_text: String = row.get(1)?;
    let dataset_id = DatasetId::parse(&dataset_text)
        .map_err(|err| RunQueryError::InvalidData(err.to_string()))?;
    let status_text: String = row.get(5)?;
    let status = RunStatus::parse(&status_text)
        .ok_or_else(|| RunQueryError::InvalidData(format!("unknown status `{status_text}`")))?;
    let counts_json: String = row.get(6)?;
    let counts: BTreeMap<EntityKind, u64> = serde_json::from_str(&counts_json)?;
    let header_json: Option<String> = row.get(10)?;
    let header = header_json
        .as_deref()
        .map(serde_json::from_str::<HeaderInfo>)
        .transpose()?;

    Ok(ImportRun {
        run_id,
        dataset_id,
        source_file: row.get(2)?,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        status,
        counts,
        errors: Vec::new(),
        progress_percent: row.get(7)?,
        records_processed: to_u64(row.get(8)?)?,
        records_skipped: to_u64(row.get(9)?)?,
        header,
    })
}

fn to_i64(value: u64) -> RunQueryResult<i64> {
    i64::try_from(value)
        .map_err(|_| RunQueryError::InvalidData(format!("value {value} exceeds storage range")))
}

fn to_u64(value: i64) -> RunQueryResult<u64> {
    u64::try_from(value)
        .map_err(|_| RunQueryError::InvalidData(format!("negative stored value {value}")))
}

fn to_usize(value: i64) -> RunQueryResult<usize> {
    usize::try_from(value)
        .map_err(|_| RunQueryError::InvalidData(format!("negative stored value {value}")))
}

#[cfg(test)]
mod tests {
    use super::{ImportAuditSink, SqliteImportRunRepository};
    use crate::db::open_db_in_memory;
    use crate::model::draft::{DatasetId, EntityKind};
    use crate::model::run::{HeaderInfo, ImportError, ImportRun, RunStatus, Severity};

    #[test]
    fn snapshots_upsert_and_append_errors() {
        let conn = open_db_in_memory().unwrap();
        let mut repo = SqliteImportRunRepository::new(&conn);
        let mut run = ImportRun::start(DatasetId::parse("tree").unwrap(), "family.ged");
        repo.save_run(&run).unwrap();

        run.push_error(
            ImportError::new(Severity::Warning, "unknown_tag", "`_MILT` ignored")
                .at_line(7)
                .in_record("@I1@ INDI"),
        );
        run.add_count(EntityKind::Person, 2);
        run.header = Some(HeaderInfo {
            source_system: Some("PAF".to_string()),
            ..HeaderInfo::default()
        });
        repo.save_run(&run).unwrap();

        run.push_error(ImportError::new(Severity::Dangling, "dangling_reference", "@F9@"));
        run.advance(RunStatus::Completed).unwrap();
        repo.save_run(&run).unwrap();

        let loaded = repo.get_run(run.run_id).unwrap().unwrap();
        assert_eq!(loaded, run);
        assert_eq!(loaded.errors.len(), 2);
        assert_eq!(loaded.errors[0].line, Some(7));
        assert_eq!(loaded.count(EntityKind::Person), 2);
    }

    #[test]
    fn list_runs_filters_by_dataset() {
        let conn = open_db_in_memory().unwrap();
        let mut repo = SqliteImportRunRepository::new(&conn);
        let first = ImportRun::start(DatasetId::parse("a").unwrap(), "a.ged");
        let second = ImportRun::start(DatasetId::parse("b").unwrap(), "b.ged");
        repo.save_run(&first).unwrap();
        repo.save_run(&second).unwrap();

        assert_eq!(repo.list_runs(None).unwrap().len(), 2);
        let only_b = repo
            .list_runs(Some(&DatasetId::parse("b").unwrap()))
            .unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].run_id, second.run_id);
    }

    #[test]
    fn missing_run_is_none() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteImportRunRepository::new(&conn);
        assert!(repo.get_run(uuid::Uuid::new_v4()).unwrap().is_none());
    }
}
