//! Import run orchestration.
//!
//! # Responsibility
//! - Drive tokenizer, assembler, mapper and resolver over one source.
//! - Buffer drafts and write them inside a single store transaction.
//! - Maintain and persist the run's audit record.
//!
//! # Invariants
//! - Status moves `running -> completed` or `running -> failed -> rolled_back`.
//! - Any fatal error leaves the destination dataset untouched.
//! - Each `(kind, local_id)` is counted once per run.
//! - A redefined record replaces everything its earlier definition wrote.
//! - Record contents never reach the log; only ids, counts and codes do.

use crate::import::batch::DraftBatch;
use crate::import::ledger::{DefinitionLedger, DraftKey};
use crate::import::mapper::{EntityMapper, RecordDisposition};
use crate::import::options::{CancelToken, ImportOptions};
use crate::import::xref::XrefResolver;
use crate::model::draft::{DatasetId, EntityKind, LocalId};
use crate::model::run::{ImportError, ImportRun, RunStatus, Severity};
use crate::parse::{Assembler, Parsed, Tokenizer};
use crate::repo::import_store::ImportStore;
use crate::repo::run_repo::ImportAuditSink;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::io::BufRead;
use std::time::Instant;

/// Runs imports against an injected store and audit sink.
pub struct ImportCoordinator<'a, S: ?Sized, A: ?Sized> {
    store: &'a mut S,
    audit: &'a mut A,
    options: ImportOptions,
    cancel: CancelToken,
}

impl<'a, S, A> ImportCoordinator<'a, S, A>
where
    S: ImportStore + ?Sized,
    A: ImportAuditSink + ?Sized,
{
    pub fn new(store: &'a mut S, audit: &'a mut A, options: ImportOptions) -> Self {
        Self {
            store,
            audit,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Replaces the internal token with one the caller can trigger.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Imports `reader` into `dataset_id` and returns the final run record.
    ///
    /// Never returns `Err`: every failure is recorded in the returned run.
    pub fn run<R: BufRead>(
        &mut self,
        reader: R,
        dataset_id: DatasetId,
        source_file: &str,
    ) -> ImportRun {
        let started_at = Instant::now();
        let mut run = ImportRun::start(dataset_id.clone(), source_file);
        info!(
            "event=import_run module=import status=start run_id={} dataset_id={} stop_on_error={}",
            run.run_id, dataset_id, self.options.stop_on_error
        );
        self.save(&run);

        if let Err(err) = self.store.begin(&dataset_id) {
            run.push_error(ImportError::new(
                Severity::Fatal,
                "storage_error",
                format!("could not open import transaction: {err}"),
            ));
            transition(&mut run, RunStatus::Failed);
            return self.finish(run, started_at);
        }

        self.stream(reader, &dataset_id, &mut run);

        if run.has_fatal() {
            self.abort(&mut run);
        } else {
            match self.store.commit() {
                Ok(()) => {
                    transition(&mut run, RunStatus::Completed);
                    if self.options.total_bytes.is_some() {
                        run.progress_percent = Some(100);
                    }
                }
                Err(err) => {
                    run.push_error(ImportError::new(
                        Severity::Fatal,
                        "storage_error",
                        format!("commit failed: {err}"),
                    ));
                    self.abort(&mut run);
                }
            }
        }

        self.finish(run, started_at)
    }

    fn stream<R: BufRead>(&mut self, reader: R, dataset_id: &DatasetId, run: &mut ImportRun) {
        let mapper = EntityMapper::new(dataset_id.clone(), self.options.mapper_options());
        let mut resolver = XrefResolver::new(dataset_id.clone());
        let mut batch = DraftBatch::new();
        let mut seen: HashSet<DraftKey> = HashSet::new();
        let mut ledger = DefinitionLedger::new();
        let mut trailer_line: Option<usize> = None;
        let mut since_snapshot = 0usize;
        let batch_size = self.options.batch_size.max(1);
        let progress_interval = self.options.progress_interval.max(1);

        let mut records = Assembler::new(Tokenizer::new(reader));
        loop {
            if self.cancel.is_cancelled() {
                run.push_error(ImportError::new(
                    Severity::Fatal,
                    "cancelled",
                    "import cancelled before completion",
                ));
                return;
            }

            let record = match records.next() {
                None => break,
                Some(Err(err)) => {
                    run.push_error(ImportError::new(
                        Severity::Fatal,
                        "io_error",
                        err.to_string(),
                    ));
                    return;
                }
                Some(Ok(Parsed::Issue(issue))) => {
                    run.push_error(
                        ImportError::new(Severity::Warning, issue.code(), issue.to_string())
                            .at_line(issue.line),
                    );
                    continue;
                }
                Some(Ok(Parsed::Item(record))) => record,
            };

            run.records_processed += 1;
            if let Some(line) = trailer_line {
                run.push_error(
                    ImportError::new(
                        Severity::Warning,
                        "record_after_trailer",
                        format!("record follows the trailer at line {line}"),
                    )
                    .at_line(record.line)
                    .in_record(record.label()),
                );
            }

            match mapper.map(&record, &mut resolver) {
                Ok(mapped) => {
                    for warning in mapped.warnings {
                        run.push_error(warning);
                    }
                    if let RecordDisposition::Entity { kind, declaration } = &mapped.disposition {
                        let owner = (*kind, declaration.local_id.clone());
                        let dependents = mapped
                            .drafts
                            .iter()
                            .map(|draft| (draft.kind(), draft.local_id().clone()))
                            .filter(|key| *key != owner)
                            .collect();
                        let released = ledger.define(owner, dependents);
                        if !released.is_empty()
                            && !self.retract(&released, &mut batch, &mut seen, run)
                        {
                            return;
                        }
                    }
                    match mapped.disposition {
                        RecordDisposition::Header(header) => run.header = Some(header),
                        RecordDisposition::Trailer => trailer_line = Some(record.line),
                        RecordDisposition::Skipped(reason) => {
                            run.records_skipped += 1;
                            debug!(
                                "event=import_record module=import status=skipped line={} reason={:?}",
                                record.line, reason
                            );
                        }
                        RecordDisposition::Entity { .. } => {}
                    }
                    for draft in &mapped.drafts {
                        if seen.insert((draft.kind(), draft.local_id().clone())) {
                            run.add_count(draft.kind(), 1);
                        }
                    }
                    if !mapped.drafts.is_empty() {
                        batch.push_record(mapped.drafts);
                    }
                }
                Err(err) => {
                    let severity = if self.options.stop_on_error {
                        Severity::Fatal
                    } else {
                        Severity::Error
                    };
                    run.records_skipped += 1;
                    run.push_error(
                        ImportError::new(severity, err.code(), err.to_string())
                            .at_line(err.line())
                            .in_record(record.label()),
                    );
                    if severity == Severity::Fatal {
                        return;
                    }
                }
            }

            if batch.records() >= batch_size && !self.flush(&mut batch, run) {
                return;
            }

            since_snapshot += 1;
            if since_snapshot >= progress_interval {
                since_snapshot = 0;
                run.progress_percent = self.progress(records.get_ref().bytes_read());
                self.save(run);
            }
        }

        if !batch.is_empty() && !self.flush(&mut batch, run) {
            return;
        }
        report_unresolved(resolver, run);
    }

    /// Writes the batch; returns `false` after recording a fatal error.
    fn flush(&mut self, batch: &mut DraftBatch, run: &mut ImportRun) -> bool {
        let records = batch.records();
        match batch.flush(&mut *self.store) {
            Ok(()) => {
                debug!("event=import_flush module=import status=ok records={records}");
                true
            }
            Err(err) => {
                run.push_error(ImportError::new(
                    Severity::Fatal,
                    "storage_error",
                    err.to_string(),
                ));
                false
            }
        }
    }

    /// Deletes drafts only a superseded definition produced; returns `false`
    /// after recording a fatal error.
    fn retract(
        &mut self,
        released: &[DraftKey],
        batch: &mut DraftBatch,
        seen: &mut HashSet<DraftKey>,
        run: &mut ImportRun,
    ) -> bool {
        // Buffered copies must reach the store before they can be deleted.
        if !batch.is_empty() && !self.flush(batch, run) {
            return false;
        }
        for kind in EntityKind::ALL {
            let ids: Vec<LocalId> = released
                .iter()
                .filter(|(released_kind, _)| *released_kind == kind)
                .map(|(_, local_id)| local_id.clone())
                .collect();
            if ids.is_empty() {
                continue;
            }
            if let Err(err) = self.store.delete_entities(kind, &ids) {
                run.push_error(ImportError::new(
                    Severity::Fatal,
                    "storage_error",
                    err.to_string(),
                ));
                return false;
            }
            for local_id in ids {
                if seen.remove(&(kind, local_id)) {
                    run.remove_count(kind, 1);
                }
            }
        }
        debug!(
            "event=import_retract module=import status=ok drafts={}",
            released.len()
        );
        true
    }

    fn abort(&mut self, run: &mut ImportRun) {
        transition(run, RunStatus::Failed);
        match self.store.rollback() {
            Ok(()) => {
                for count in run.counts.values_mut() {
                    *count = 0;
                }
                transition(run, RunStatus::RolledBack);
            }
            Err(err) => {
                error!(
                    "event=import_rollback module=import status=error run_id={} error={err}",
                    run.run_id
                );
                run.push_error(ImportError::new(
                    Severity::Fatal,
                    "rollback_failed",
                    err.to_string(),
                ));
            }
        }
    }

    fn finish(&mut self, run: ImportRun, started_at: Instant) -> ImportRun {
        self.save(&run);

        let duration_ms = started_at.elapsed().as_millis();
        if run.status == RunStatus::Completed {
            info!(
                "event=import_run module=import status=ok run_id={} persons={} families={} events={} errors={} dangling={} duration_ms={duration_ms}",
                run.run_id,
                run.count(EntityKind::Person),
                run.count(EntityKind::Family),
                run.count(EntityKind::Event),
                run.error_count(Severity::Error),
                run.error_count(Severity::Dangling),
            );
        } else {
            let code = run
                .errors
                .iter()
                .find(|error| error.severity == Severity::Fatal)
                .map_or("unknown", |error| error.code.as_str());
            error!(
                "event=import_run module=import status=error run_id={} final_status={} error_code={code} duration_ms={duration_ms}",
                run.run_id,
                run.status.as_str(),
            );
        }
        run
    }

    fn save(&mut self, run: &ImportRun) {
        if let Err(err) = self.audit.save_run(run) {
            warn!(
                "event=import_audit module=import status=error run_id={} error={err}",
                run.run_id
            );
        }
    }

    fn progress(&self, bytes_read: u64) -> Option<u8> {
        let total = self.options.total_bytes.filter(|total| *total > 0)?;
        let percent = (bytes_read.saturating_mul(100) / total).min(99);
        u8::try_from(percent).ok()
    }
}

fn report_unresolved(resolver: XrefResolver, run: &mut ImportRun) {
    let report = resolver.finish();
    for dangling in report.dangling {
        run.push_error(
            ImportError::new(
                Severity::Dangling,
                "dangling_reference",
                format!(
                    "@{}@ referenced as {} {} time(s) but never defined",
                    dangling.xref,
                    dangling.expected.as_str(),
                    dangling.occurrences
                ),
            )
            .at_line(dangling.line),
        );
    }
    for mismatch in report.mismatches {
        run.push_error(
            ImportError::new(
                Severity::Dangling,
                "kind_mismatch",
                format!(
                    "@{}@ referenced as {} but defined as {}",
                    mismatch.xref,
                    mismatch.expected.as_str(),
                    mismatch.declared.as_str()
                ),
            )
            .at_line(mismatch.line),
        );
    }
}

fn transition(run: &mut ImportRun, next: RunStatus) {
    if let Err(err) = run.advance(next) {
        error!(
            "event=import_status module=import status=error run_id={} error={err}",
            run.run_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::ImportCoordinator;
    use crate::import::options::{CancelToken, ImportOptions};
    use crate::model::draft::{DatasetId, EntityKind};
    use crate::model::run::{RunStatus, Severity};
    use crate::repo::memory::{MemoryAuditLog, MemoryImportStore};
    use std::io::Cursor;

    const SMALL_TREE: &str = "\
0 HEAD
1 GEDC
2 VERS 5.5.1
1 CHAR UTF-8
0 @I1@ INDI
1 NAME John /Smith/
1 SEX M
1 FAMS @F1@
0 @I2@ INDI
1 NAME Mary /Jones/
1 SEX F
1 FAMS @F1@
0 @I3@ INDI
1 NAME Ann /Smith/
1 FAMC @F1@
0 @F1@ FAM
1 HUSB @I1@
1 WIFE @I2@
1 CHIL @I3@
1 MARR
2 DATE 3 MAY 1840
0 TRLR
";

    fn dataset() -> DatasetId {
        DatasetId::parse("tree").unwrap()
    }

    #[test]
    fn completed_run_counts_each_entity_once() {
        let mut store = MemoryImportStore::new();
        let mut audit = MemoryAuditLog::new();
        let run = ImportCoordinator::new(&mut store, &mut audit, ImportOptions::default()).run(
            Cursor::new(SMALL_TREE),
            dataset(),
            "small.ged",
        );

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.count(EntityKind::Person), 3);
        assert_eq!(run.count(EntityKind::Family), 1);
        // FAMC and CHIL name the same pair.
        assert_eq!(run.count(EntityKind::ChildLink), 1);
        assert_eq!(run.count(EntityKind::Event), 1);
        assert!(run.errors.is_empty());
        assert_eq!(run.records_processed, 6);
        assert_eq!(
            run.header.as_ref().and_then(|h| h.gedcom_version.as_deref()),
            Some("5.5.1")
        );

        assert_eq!(store.count(&dataset(), EntityKind::ChildLink), 1);
        let link = store.child_links(&dataset())[0].clone();
        assert_eq!(link.sequence, Some(1));

        let snapshots = audit.snapshots();
        assert_eq!(snapshots.first().unwrap().status, RunStatus::Running);
        assert_eq!(snapshots.last().unwrap(), &run);
    }

    #[test]
    fn cancelled_run_rolls_back() {
        let mut store = MemoryImportStore::new();
        let mut audit = MemoryAuditLog::new();
        let token = CancelToken::new();
        token.cancel();

        let run = ImportCoordinator::new(&mut store, &mut audit, ImportOptions::default())
            .with_cancel_token(token)
            .run(Cursor::new(SMALL_TREE), dataset(), "small.ged");

        assert_eq!(run.status, RunStatus::RolledBack);
        assert_eq!(run.errors[0].code, "cancelled");
        assert_eq!(store.count(&dataset(), EntityKind::Person), 0);
        assert!(!store.in_transaction());
    }

    #[test]
    fn storage_failure_is_fatal_even_when_tolerant() {
        let mut store = MemoryImportStore::failing_on(EntityKind::Event);
        let mut audit = MemoryAuditLog::new();
        let run = ImportCoordinator::new(&mut store, &mut audit, ImportOptions::tolerant()).run(
            Cursor::new(SMALL_TREE),
            dataset(),
            "small.ged",
        );

        assert_eq!(run.status, RunStatus::RolledBack);
        assert!(run
            .errors
            .iter()
            .any(|e| e.severity == Severity::Fatal && e.code == "storage_error"));
        assert!(run.counts.values().all(|count| *count == 0));
        assert_eq!(store.count(&dataset(), EntityKind::Person), 0);
    }

    #[test]
    fn progress_snapshots_follow_interval() {
        let mut store = MemoryImportStore::new();
        let mut audit = MemoryAuditLog::new();
        let options = ImportOptions {
            progress_interval: 2,
            batch_size: 1,
            total_bytes: Some(SMALL_TREE.len() as u64),
            ..ImportOptions::default()
        };
        let run = ImportCoordinator::new(&mut store, &mut audit, options).run(
            Cursor::new(SMALL_TREE),
            dataset(),
            "small.ged",
        );

        // start + 3 interval snapshots + final
        assert_eq!(audit.snapshots().len(), 5);
        let middle = &audit.snapshots()[1];
        assert_eq!(middle.status, RunStatus::Running);
        assert!(middle.progress_percent.unwrap() < 100);
        assert_eq!(run.progress_percent, Some(100));
    }

    #[test]
    fn dangling_reference_is_reported_and_run_completes() {
        let input = "0 @I1@ INDI\n1 FAMC @F404@\n0 TRLR\n";
        let mut store = MemoryImportStore::new();
        let mut audit = MemoryAuditLog::new();
        let run = ImportCoordinator::new(&mut store, &mut audit, ImportOptions::default()).run(
            Cursor::new(input),
            dataset(),
            "dangling.ged",
        );

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.error_count(Severity::Dangling), 1);
        let dangling = &run.errors[0];
        assert_eq!(dangling.code, "dangling_reference");
        assert_eq!(dangling.line, Some(2));
        assert_eq!(store.count(&dataset(), EntityKind::ChildLink), 1);
    }
}
