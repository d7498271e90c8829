//! Error types for the CLI application.

use finscribe_extractor::ExtractorError;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline error
    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    /// Provider setup error
    #[error("Provider error: {0}")]
    Provider(#[from] finscribe_llm::LlmError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CliError {
    /// Whether the run was stopped by the user
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CliError::Extractor(ExtractorError::Cancelled))
    }
}
