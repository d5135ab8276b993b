//! Import pipeline: tag dispatch, mapping, resolution and orchestration.
//!
//! # Responsibility
//! - Turn assembled records into dataset-scoped drafts.
//! - Run one all-or-nothing import per source file.
//!
//! # See also
//! - `parse` for the tokenizer and assembler feeding this module.

pub mod batch;
pub mod coordinator;
mod ledger;
pub mod mapper;
pub mod options;
pub mod tags;
pub mod xref;

pub use coordinator::ImportCoordinator;
pub use mapper::{EntityMapper, MappedRecord, MapperOptions, MappingError};
pub use options::{CancelToken, ImportOptions};
pub use xref::XrefResolver;
