//! Transaction records returned by the extraction pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One detected financial transaction.
///
/// A record is a flat JSON object whose keys are the schema's declared fields,
/// plus the file-identifier field naming the document it was found in. Several
/// records may share a file identifier; a document may also yield none.
///
/// # Examples
///
/// ```
/// use finscribe_domain::TransactionRecord;
/// use serde_json::json;
///
/// let mut record = TransactionRecord::default();
/// record.set("amount", json!(12.5));
/// record.set("original_file_name", json!("receipt.pdf"));
///
/// assert_eq!(record.source("original_file_name"), Some("receipt.pdf"));
/// assert_eq!(record.get("amount"), Some(&json!(12.5)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRecord(Map<String, Value>);

impl TransactionRecord {
    /// Wrap an already validated field map
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Get a field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field value, replacing any previous value
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// The originating file identifier stored under `field`, if it is a string
    pub fn source(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Borrow the underlying field map
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the record and return its field map
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}
