//! Import configuration and cooperative cancellation.

use crate::import::mapper::MapperOptions;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 500;

/// Per-run import settings.
///
/// Missing fields deserialize to their defaults, so a partial JSON object
/// such as `{"stop_on_error": false}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Any mapping error aborts and rolls back the whole run.
    pub stop_on_error: bool,
    pub import_sources: bool,
    pub import_media: bool,
    /// Records buffered before drafts are flushed to storage.
    pub batch_size: usize,
    /// Records between audit snapshots.
    pub progress_interval: usize,
    /// Source size in bytes; enables `progress_percent`.
    pub total_bytes: Option<u64>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            import_sources: true,
            import_media: true,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            total_bytes: None,
        }
    }
}

impl ImportOptions {
    /// Tolerant preset: mapping errors drop the record and the run continues.
    pub fn tolerant() -> Self {
        Self {
            stop_on_error: false,
            ..Self::default()
        }
    }

    pub fn mapper_options(&self) -> MapperOptions {
        MapperOptions {
            import_sources: self.import_sources,
            import_media: self.import_media,
        }
    }
}

/// Shared flag checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
