//! GEDCOM import core.
//!
//! Streams a GEDCOM file through tokenizer, assembler, mapper and resolver
//! into a transactional store, recording an auditable import run.

pub mod date;
pub mod db;
pub mod import;
pub mod logging;
pub mod model;
pub mod parse;
pub mod repo;

pub use date::{normalize, DatePrecision, DateQualifier, DateValue};
pub use import::{CancelToken, EntityMapper, ImportCoordinator, ImportOptions, MappingError, XrefResolver};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::draft::{DatasetId, EntityDraft, EntityKind, LocalId};
pub use model::run::{ImportError, ImportRun, RunId, RunStatus, Severity};
pub use repo::import_store::{ImportStore, SqliteImportStore, StoreError, StoreResult};
pub use repo::memory::{MemoryAuditLog, MemoryImportStore};
pub use repo::run_repo::{ImportAuditSink, RunQueryError, SqliteImportRunRepository};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
