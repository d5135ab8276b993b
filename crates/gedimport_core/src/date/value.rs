//! Normalized genealogical date value.
//!
//! # Responsibility
//! - Hold both the verbatim display text and the sortable calendar date.
//! - Reconstruct canonical display text from the parsed components.
//!
//! # Invariants
//! - `is_valid == false` implies `sortable_date.is_none()`.
//! - `precision` never claims a component that is `None`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub(crate) const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Modifier attached to an approximate date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateQualifier {
    #[default]
    None,
    About,
    Before,
    After,
    Between,
    Estimated,
    Calculated,
}

impl DateQualifier {
    /// Canonical GEDCOM keyword used when rebuilding display text.
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::About => Some("ABT"),
            Self::Before => Some("BEF"),
            Self::After => Some("AFT"),
            Self::Between => Some("BET"),
            Self::Estimated => Some("EST"),
            Self::Calculated => Some("CAL"),
        }
    }

    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::About => "about",
            Self::Before => "before",
            Self::After => "after",
            Self::Between => "between",
            Self::Estimated => "estimated",
            Self::Calculated => "calculated",
        }
    }
}

/// Finest calendar unit actually supplied by the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

impl DatePrecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
        }
    }
}

/// Dual-representation date: verbatim source text plus a sortable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateValue {
    /// Source text exactly as read, never modified.
    pub original: String,
    /// Always-orderable calendar date. Absent only when `is_valid` is false.
    pub sortable_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub qualifier: DateQualifier,
    /// Year of the closing side for `BET .. AND ..` ranges.
    pub end_year: Option<i32>,
    pub precision: Option<DatePrecision>,
    pub is_valid: bool,
}

impl DateValue {
    /// Builds an unparseable value that keeps `raw` for display.
    pub fn invalid(raw: impl Into<String>) -> Self {
        Self {
            original: raw.into(),
            sortable_date: None,
            year: None,
            month: None,
            day: None,
            qualifier: DateQualifier::None,
            end_year: None,
            precision: None,
            is_valid: false,
        }
    }

    /// Sortable date as ISO `YYYY-MM-DD` text.
    pub fn sortable_iso(&self) -> Option<String> {
        self.sortable_date
            .map(|date| date.format("%Y-%m-%d").to_string())
    }

    /// Rebuilds display text from parsed components.
    ///
    /// Invalid values return `original` verbatim. Day and month are rendered
    /// only when they were present in the source.
    pub fn display(&self) -> String {
        if !self.is_valid {
            return self.original.clone();
        }

        let mut parts: Vec<String> = Vec::with_capacity(6);
        if let Some(keyword) = self.qualifier.keyword() {
            parts.push(keyword.to_string());
        }
        if let Some(day) = self.day {
            parts.push(day.to_string());
        }
        if let Some(month) = self.month {
            if let Some(name) = month_abbreviation(month) {
                parts.push(name.to_string());
            }
        }
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        if let Some(end_year) = self.end_year {
            parts.push("AND".to_string());
            parts.push(end_year.to_string());
        }
        parts.join(" ")
    }
}

pub(crate) fn month_abbreviation(month: u32) -> Option<&'static str> {
    let index = usize::try_from(month).ok()?.checked_sub(1)?;
    MONTH_ABBREVIATIONS.get(index).copied()
}
