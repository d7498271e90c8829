//! Source text produced by the text-extraction stage

use serde::{Deserialize, Serialize};

/// Plain text extracted from one source document.
///
/// The identifier is unique per document within a run and is what every
/// extracted record points back to. The text itself is opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceText {
    /// Unique identifier of the source document (usually its file name)
    pub file_identifier: String,

    /// Extracted text content
    pub text: String,
}

impl SourceText {
    /// Create a new source text
    pub fn new(file_identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_identifier: file_identifier.into(),
            text: text.into(),
        }
    }
}
