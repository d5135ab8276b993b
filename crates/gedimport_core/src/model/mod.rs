//! Import domain model.
//!
//! # Responsibility
//! - Define entity drafts handed to storage.
//! - Define the durable import run audit record.
//!
//! # Invariants
//! - Every entity is identified by `(DatasetId, LocalId)` per kind.
//! - Cross-entity references use `LocalId`, never in-memory pointers.

pub mod draft;
pub mod run;
