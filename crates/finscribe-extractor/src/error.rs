//! Error types for the extraction pipeline

use finscribe_domain::SchemaError;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while batching, extracting or persisting
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// Invalid configuration: batch size, missing field, malformed schema or
    /// template, or persisted progress that does not match the input.
    /// Fatal and never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A recoverable service failure (network, throttling, malformed body)
    #[error("Transient service error: {0}")]
    Transient(String),

    /// A batch could not be extracted, either after every retry was spent or
    /// because the service refused the request outright
    #[error("Batch {batch_index} failed after {attempts} attempt(s) (files: {}): {reason}", .files.join(", "))]
    BatchFailed {
        /// Zero-based index of the failed batch
        batch_index: usize,
        /// Identifiers of the source files in the batch
        files: Vec<String>,
        /// Number of service calls made for the batch, all of which failed
        attempts: u32,
        /// Total time spent waiting between those calls
        backoff: Duration,
        /// Last error reported by the service
        reason: String,
    },

    /// Reading or writing the persisted result set failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The run was cancelled between batches or during a retry delay
    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractorError {
    /// Whether the error is a configuration problem
    pub fn is_config(&self) -> bool {
        matches!(self, ExtractorError::Config(_))
    }
}

impl From<SchemaError> for ExtractorError {
    fn from(e: SchemaError) -> Self {
        ExtractorError::Config(format!("Invalid response_schema: {}", e))
    }
}

impl From<std::io::Error> for ExtractorError {
    fn from(e: std::io::Error) -> Self {
        ExtractorError::Persistence(e.to_string())
    }
}
