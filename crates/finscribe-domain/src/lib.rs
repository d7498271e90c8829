//! Finscribe Domain Layer
//!
//! Core value types and trait boundaries for turning extracted document text
//! into a normalized table of financial transactions.
//!
//! ## Key Concepts
//!
//! - **SourceText**: Plain text produced for one source document, keyed by file identity
//! - **SchemaDescriptor**: Declared record shape (field names, kinds, required-ness)
//! - **TransactionRecord**: One detected transaction, conforming to the schema and
//!   always carrying the identifier of the document it came from
//! - **GenerationProvider**: The boundary to a schema-constrained generation service
//!
//! ## Architecture
//!
//! This crate holds no I/O. Provider implementations live in `finscribe-llm`,
//! the batching and extraction pipeline in `finscribe-extractor`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod record;
pub mod schema;
pub mod source;
pub mod traits;

// Re-exports for convenience
pub use record::TransactionRecord;
pub use schema::{FieldKind, FieldSpec, FieldViolation, SchemaDescriptor, SchemaError};
pub use source::SourceText;
pub use traits::{GenerationProvider, RetryClass};
