//! Source document links from the download stage's metadata file

use crate::error::ExtractorError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Value written when a record's source file has no known link
pub const LINK_NOT_FOUND: &str = "Link not found";

/// Value used for a metadata entry that names a file but carries no link
pub const LINK_NOT_AVAILABLE: &str = "Link not available";

#[derive(Debug, Deserialize)]
struct FileMetadata {
    filename: Option<String>,
    link: Option<String>,
}

/// Lookup from source file name to the link of the original document.
///
/// Built from a `files_metadata.json` of the form
/// `{ "<id>": { "filename": ..., "link": ..., "local_path": ... } }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLinks {
    links: HashMap<String, String>,
}

impl SourceLinks {
    /// Read a metadata file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExtractorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExtractorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let links = Self::from_json(&contents)?;
        debug!("Loaded links for {} files from {}", links.len(), path.display());
        Ok(links)
    }

    /// Parse metadata JSON. Entries without a file name are ignored.
    pub fn from_json(json: &str) -> Result<Self, ExtractorError> {
        let entries: HashMap<String, FileMetadata> = serde_json::from_str(json)
            .map_err(|e| ExtractorError::Config(format!("Invalid files metadata: {}", e)))?;

        let links = entries
            .into_values()
            .filter_map(|entry| {
                let filename = entry.filename?;
                let link = entry.link.unwrap_or_else(|| LINK_NOT_AVAILABLE.to_string());
                Some((filename, link))
            })
            .collect();
        Ok(Self { links })
    }

    /// Link for a file, if known
    pub fn get(&self, file_identifier: &str) -> Option<&str> {
        self.links.get(file_identifier).map(String::as_str)
    }

    /// Link value to store on a record from `file_identifier`
    pub fn link_value(&self, file_identifier: &str) -> Value {
        Value::String(self.get(file_identifier).unwrap_or(LINK_NOT_FOUND).to_string())
    }

    /// Number of files with links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if no links were loaded
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl FromIterator<(String, String)> for SourceLinks {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            links: iter.into_iter().collect(),
        }
    }
}
