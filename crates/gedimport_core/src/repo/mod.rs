//! Storage ports and their adapters.
//!
//! # Responsibility
//! - Define the entity write port and the audit port used by the importer.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Entity writes happen only inside a store transaction.
//! - Audit snapshots are upserts keyed by run id.

pub mod import_store;
pub mod memory;
pub mod run_repo;
