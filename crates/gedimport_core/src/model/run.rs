//! Import run audit model.
//!
//! # Responsibility
//! - Track status, per-kind counts and ordered errors of one import run.
//!
//! # Invariants
//! - Status moves strictly `running -> completed` or
//!   `running -> failed -> rolled_back`.
//! - `completed_at` is set exactly when a terminal status is reached.

use crate::model::draft::{DatasetId, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RunId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    RolledBack,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "rolled_back" => Some(Self::RolledBack),
            _ => None,
        }
    }

    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Failed, Self::RolledBack)
        )
    }

    /// Whether no further transition is possible from this status.
    ///
    /// `Failed` counts as terminal when a rollback could not be applied.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Report severity, ordered from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Data-quality or forward-compatibility notice.
    Warning,
    /// Cross-reference never resolved or resolved to the wrong kind.
    Dangling,
    /// Record dropped in tolerant mode.
    Error,
    /// Aborts the run and forces rollback.
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Dangling => "dangling",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "warning" => Some(Self::Warning),
            "dangling" => Some(Self::Dangling),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }
}

/// One reported problem with enough context to locate the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportError {
    pub severity: Severity,
    /// Stable machine-readable code, e.g. `unknown_tag`.
    pub code: String,
    pub message: String,
    /// 1-based source line.
    pub line: Option<usize>,
    /// Record label such as `@I3@ INDI`.
    pub record: Option<String>,
}

impl ImportError {
    pub fn new(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            line: None,
            record: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn in_record(mut self, record: impl Into<String>) -> Self {
        self.record = Some(record.into());
        self
    }
}

/// Metadata read from the `HEAD` record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub source_system: Option<String>,
    pub gedcom_version: Option<String>,
    pub charset: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTransitionError {
    pub from: RunStatus,
    pub to: RunStatus,
}

impl Display for RunTransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "import run cannot move from `{}` to `{}`",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl Error for RunTransitionError {}

/// Durable audit record of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRun {
    pub run_id: RunId,
    pub dataset_id: DatasetId,
    pub source_file: String,
    /// Unix epoch milliseconds.
    pub started_at: i64,
    /// Unix epoch milliseconds.
    pub completed_at: Option<i64>,
    pub status: RunStatus,
    pub counts: BTreeMap<EntityKind, u64>,
    pub errors: Vec<ImportError>,
    /// Share of source bytes consumed, when the total size is known.
    pub progress_percent: Option<u8>,
    pub records_processed: u64,
    pub records_skipped: u64,
    pub header: Option<HeaderInfo>,
}

impl ImportRun {
    /// Creates a `running` run with zeroed counts for every kind.
    pub fn start(dataset_id: DatasetId, source_file: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dataset_id,
            source_file: source_file.into(),
            started_at: now_epoch_ms(),
            completed_at: None,
            status: RunStatus::Running,
            counts: EntityKind::ALL.iter().map(|kind| (*kind, 0)).collect(),
            errors: Vec::new(),
            progress_percent: None,
            records_processed: 0,
            records_skipped: 0,
            header: None,
        }
    }

    pub fn count(&self, kind: EntityKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub(crate) fn add_count(&mut self, kind: EntityKind, amount: u64) {
        *self.counts.entry(kind).or_insert(0) += amount;
    }

    pub(crate) fn remove_count(&mut self, kind: EntityKind, amount: u64) {
        if let Some(count) = self.counts.get_mut(&kind) {
            *count = count.saturating_sub(amount);
        }
    }

    pub(crate) fn push_error(&mut self, error: ImportError) {
        self.errors.push(error);
    }

    pub fn has_fatal(&self) -> bool {
        self.errors
            .iter()
            .any(|error| error.severity == Severity::Fatal)
    }

    /// Number of reported entries at exactly `severity`.
    pub fn error_count(&self, severity: Severity) -> usize {
        self.errors
            .iter()
            .filter(|error| error.severity == severity)
            .count()
    }

    pub(crate) fn advance(&mut self, next: RunStatus) -> Result<(), RunTransitionError> {
        if !self.status.can_advance_to(next) {
            return Err(RunTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(now_epoch_ms());
        }
        Ok(())
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
