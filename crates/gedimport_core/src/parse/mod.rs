//! Line-oriented GEDCOM parsing.
//!
//! # Responsibility
//! - Tokenize physical lines into [`RawToken`]s, folding `CONT`/`CONC`.
//! - Assemble tokens into one [`Record`] tree per level-0 block.
//!
//! # Invariants
//! - Both stages are lazy and pull-based; neither buffers the whole input.
//! - Recoverable problems surface as [`Parsed::Issue`] in stream order.
//! - Only I/O failure ends a stream early, as `Err(ParseError)`.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod assembler;
mod record;
mod tokenizer;

pub use assembler::Assembler;
pub use record::{parse_pointer, Record};
pub use tokenizer::{RawToken, Tokenizer};

const MAX_SNIPPET_CHARS: usize = 80;

pub type ParseResult<T> = Result<T, ParseError>;

/// One step of a parse stream: a value or a recoverable issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<T> {
    Item(T),
    Issue(ParseIssue),
}

/// Recoverable structural problem found while reading the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// 1-based physical line number.
    pub line: usize,
    pub kind: ParseIssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssueKind {
    /// Line does not match `<level> [@xref@] <tag> [<value>]`.
    MalformedLine { snippet: String },
    /// Line bytes are not valid UTF-8.
    InvalidUtf8,
    /// `CONT`/`CONC` with no preceding token to extend.
    OrphanContinuation,
    /// Level skipped one or more nesting steps.
    LevelJump { level: u32, max_expected: u32 },
    /// Nested line seen before any level-0 record.
    OrphanLine { tag: String },
}

impl ParseIssue {
    /// Stable machine-readable code used in import reports.
    pub fn code(&self) -> &'static str {
        match self.kind {
            ParseIssueKind::MalformedLine { .. } => "malformed_line",
            ParseIssueKind::InvalidUtf8 => "invalid_utf8",
            ParseIssueKind::OrphanContinuation => "orphan_continuation",
            ParseIssueKind::LevelJump { .. } => "level_jump",
            ParseIssueKind::OrphanLine { .. } => "orphan_line",
        }
    }
}

impl Display for ParseIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ParseIssueKind::MalformedLine { snippet } => {
                write!(f, "line {}: malformed line `{snippet}`", self.line)
            }
            ParseIssueKind::InvalidUtf8 => write!(f, "line {}: not valid UTF-8", self.line),
            ParseIssueKind::OrphanContinuation => write!(
                f,
                "line {}: continuation line has no preceding value",
                self.line
            ),
            ParseIssueKind::LevelJump {
                level,
                max_expected,
            } => write!(
                f,
                "line {}: level {level} skips nesting (expected at most {max_expected})",
                self.line
            ),
            ParseIssueKind::OrphanLine { tag } => write!(
                f,
                "line {}: `{tag}` appears before any top-level record",
                self.line
            ),
        }
    }
}

/// Unrecoverable read failure.
#[derive(Debug)]
pub enum ParseError {
    Io {
        /// Last line successfully read before the failure.
        line: usize,
        source: std::io::Error,
    },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { line, source } => write!(f, "read failed after line {line}: {source}"),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
        }
    }
}

pub(crate) fn snippet(value: &str) -> String {
    let mut truncated = value.chars().take(MAX_SNIPPET_CHARS).collect::<String>();
    if value.chars().count() > MAX_SNIPPET_CHARS {
        truncated.push_str("...");
    }
    truncated
}
