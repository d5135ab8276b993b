//! Genealogical date normalization.
//!
//! # Responsibility
//! - Parse qualifier-laden date expressions into sortable values.
//! - Keep the verbatim source text for display.
//!
//! # Invariants
//! - Normalization is a pure function and never fails.

mod normalize;
mod value;

pub use normalize::normalize;
pub use value::{DatePrecision, DateQualifier, DateValue};
