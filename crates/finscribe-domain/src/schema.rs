//! Schema descriptor for extracted transaction records
//!
//! The generation service is configured with a JSON-schema-like document of
//! the form
//!
//! ```json
//! {
//!   "type": "ARRAY",
//!   "items": {
//!     "type": "OBJECT",
//!     "properties": {
//!       "date":   { "type": "STRING", "description": "Transaction date" },
//!       "amount": { "type": "NUMBER" }
//!     },
//!     "required": ["date", "amount"]
//!   }
//! }
//! ```
//!
//! [`SchemaDescriptor::parse`] turns that document into a typed descriptor once
//! at startup. Every record returned by the service is then checked against the
//! descriptor without touching the raw document again.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised while building a [`SchemaDescriptor`] from its raw form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The document (or a nested part) is not a JSON object
    #[error("schema element '{0}' must be a JSON object")]
    NotAnObject(String),

    /// The top-level type is neither ARRAY nor OBJECT
    #[error("unsupported top-level schema type '{0}' (expected ARRAY of OBJECT)")]
    UnsupportedRoot(String),

    /// No properties were declared for the record object
    #[error("schema declares no record properties")]
    NoProperties,

    /// A property is missing its `type`
    #[error("property '{0}' has no type")]
    MissingType(String),

    /// A property declares a type this pipeline does not know
    #[error("property '{field}' has unknown type '{kind}'")]
    UnknownType {
        /// Property name
        field: String,
        /// Declared type
        kind: String,
    },

    /// `required` names a property that is not declared
    #[error("required field '{0}' is not a declared property")]
    UnknownRequired(String),
}

/// Primitive kind of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// Integral JSON number
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl FieldKind {
    /// Parse a schema type name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => Some(FieldKind::String),
            "NUMBER" => Some(FieldKind::Number),
            "INTEGER" => Some(FieldKind::Integer),
            "BOOLEAN" => Some(FieldKind::Boolean),
            "ARRAY" => Some(FieldKind::Array),
            "OBJECT" => Some(FieldKind::Object),
            _ => None,
        }
    }

    /// Whether a non-null value is compatible with this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    /// Canonical schema spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "STRING",
            FieldKind::Number => "NUMBER",
            FieldKind::Integer => "INTEGER",
            FieldKind::Boolean => "BOOLEAN",
            FieldKind::Array => "ARRAY",
            FieldKind::Object => "OBJECT",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared field of the record shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as it appears in records
    pub name: String,
    /// Declared primitive kind
    pub kind: FieldKind,
    /// Whether the field must be present in every record
    pub required: bool,
    /// Whether `null` is an acceptable value
    pub nullable: bool,
    /// Human-readable description, if the schema carries one
    pub description: Option<String>,
}

/// Why a returned object failed the schema check
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldViolation {
    /// The service returned something other than an object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("missing required field '{0}'")]
    Missing(String),

    /// A non-nullable required field is null
    #[error("required field '{0}' is null")]
    Null(String),

    /// A field's value does not match its declared kind
    #[error("field '{field}' expected {expected}, found {found}")]
    WrongType {
        /// Field name
        field: String,
        /// Declared kind
        expected: FieldKind,
        /// JSON type actually found
        found: &'static str,
    },
}

/// Typed, immutable description of a valid transaction record.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    fields: Vec<FieldSpec>,
    service_schema: Value,
}

impl SchemaDescriptor {
    /// Build a descriptor from the raw schema document.
    ///
    /// Accepts either an `ARRAY` whose `items` describe the record object, or
    /// the record `OBJECT` itself (which is then wrapped in an array schema for
    /// the service, since the service must return a list of records).
    pub fn parse(raw: &Value) -> Result<Self, SchemaError> {
        let root = raw
            .as_object()
            .ok_or_else(|| SchemaError::NotAnObject("root".to_string()))?;

        let root_type = root
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("ARRAY")
            .to_ascii_uppercase();

        let (item, service_schema) = match root_type.as_str() {
            "ARRAY" => {
                let item = root
                    .get("items")
                    .and_then(Value::as_object)
                    .ok_or_else(|| SchemaError::NotAnObject("items".to_string()))?;
                (item, raw.clone())
            }
            "OBJECT" => {
                let wrapped = serde_json::json!({ "type": "ARRAY", "items": raw.clone() });
                (root, wrapped)
            }
            other => return Err(SchemaError::UnsupportedRoot(other.to_string())),
        };

        let properties = item
            .get("properties")
            .and_then(Value::as_object)
            .ok_or(SchemaError::NoProperties)?;
        if properties.is_empty() {
            return Err(SchemaError::NoProperties);
        }

        let required: Vec<&str> = item
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for name in &required {
            if !properties.contains_key(*name) {
                return Err(SchemaError::UnknownRequired(name.to_string()));
            }
        }

        let mut fields = Vec::with_capacity(properties.len());
        for (name, property) in properties {
            let property = property
                .as_object()
                .ok_or_else(|| SchemaError::NotAnObject(name.clone()))?;
            let type_name = property
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| SchemaError::MissingType(name.clone()))?;
            let kind = FieldKind::parse(type_name).ok_or_else(|| SchemaError::UnknownType {
                field: name.clone(),
                kind: type_name.to_string(),
            })?;

            fields.push(FieldSpec {
                name: name.clone(),
                kind,
                required: required.contains(&name.as_str()),
                nullable: property
                    .get("nullable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                description: property
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
        }

        Ok(Self {
            fields,
            service_schema,
        })
    }

    /// Declared fields, in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up a declared field by name
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Comma-separated field names, as substituted into prompts
    pub fn field_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Schema document to send to the generation service (always an array schema)
    pub fn service_schema(&self) -> &Value {
        &self.service_schema
    }

    /// Check one returned value against the declared shape.
    ///
    /// Collects every violation rather than stopping at the first one, so a
    /// rejected record can be logged with the full reason.
    pub fn check(&self, value: &Value) -> Result<(), Vec<FieldViolation>> {
        let object = value.as_object().ok_or_else(|| vec![FieldViolation::NotAnObject])?;

        let mut violations = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None if field.required => violations.push(FieldViolation::Missing(field.name.clone())),
                None => {}
                Some(Value::Null) if field.nullable || !field.required => {}
                Some(Value::Null) => violations.push(FieldViolation::Null(field.name.clone())),
                Some(v) if !field.kind.accepts(v) => violations.push(FieldViolation::WrongType {
                    field: field.name.clone(),
                    expected: field.kind,
                    found: json_type_name(v),
                }),
                Some(_) => {}
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Project an object onto the declared fields.
    ///
    /// Keeps declared fields in declaration order, fills absent ones with
    /// `null` and drops anything undeclared.
    pub fn project(&self, object: &Map<String, Value>) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| {
                let value = object.get(&f.name).cloned().unwrap_or(Value::Null);
                (f.name.clone(), value)
            })
            .collect()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> Value {
        json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "original_file_name": { "type": "STRING" },
                    "date": { "type": "STRING", "description": "Transaction date" },
                    "amount": { "type": "NUMBER" },
                    "quantity": { "type": "INTEGER", "nullable": true },
                    "memo": { "type": "string" }
                },
                "required": ["original_file_name", "date", "amount"]
            }
        })
    }

    #[test]
    fn test_parse_keeps_declaration_order() {
        let schema = SchemaDescriptor::parse(&sample_schema()).unwrap();
        assert_eq!(
            schema.field_list(),
            "original_file_name, date, amount, quantity, memo"
        );
        assert!(schema.field("amount").unwrap().required);
        assert!(!schema.field("memo").unwrap().required);
        assert_eq!(schema.field("memo").unwrap().kind, FieldKind::String);
        assert_eq!(
            schema.field("date").unwrap().description.as_deref(),
            Some("Transaction date")
        );
    }

    #[test]
    fn test_object_root_is_wrapped_for_service() {
        let raw = json!({
            "type": "OBJECT",
            "properties": { "amount": { "type": "NUMBER" } }
        });
        let schema = SchemaDescriptor::parse(&raw).unwrap();
        assert_eq!(schema.service_schema()["type"], "ARRAY");
        assert_eq!(schema.service_schema()["items"], raw);
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let raw = json!({
            "type": "ARRAY",
            "items": { "properties": { "amount": { "type": "MONEY" } } }
        });
        assert!(matches!(
            SchemaDescriptor::parse(&raw),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_required() {
        let raw = json!({
            "type": "ARRAY",
            "items": {
                "properties": { "amount": { "type": "NUMBER" } },
                "required": ["date"]
            }
        });
        assert_eq!(
            SchemaDescriptor::parse(&raw),
            Err(SchemaError::UnknownRequired("date".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_empty_properties() {
        let raw = json!({ "type": "ARRAY", "items": { "properties": {} } });
        assert_eq!(SchemaDescriptor::parse(&raw), Err(SchemaError::NoProperties));
        assert!(SchemaDescriptor::parse(&json!("not a schema")).is_err());
    }

    #[test]
    fn test_check_accepts_well_formed_record() {
        let schema = SchemaDescriptor::parse(&sample_schema()).unwrap();
        let record = json!({
            "original_file_name": "a.pdf",
            "date": "2024-01-02",
            "amount": 10.5,
            "quantity": null
        });
        assert!(schema.check(&record).is_ok());
    }

    #[test]
    fn test_check_reports_every_violation() {
        let schema = SchemaDescriptor::parse(&sample_schema()).unwrap();
        let record = json!({
            "original_file_name": "a.pdf",
            "date": null,
            "amount": "ten",
            "quantity": 1.5
        });
        let violations = schema.check(&record).unwrap_err();
        assert_eq!(violations.len(), 3);
        assert!(violations.contains(&FieldViolation::Null("date".to_string())));
        assert!(violations
            .iter()
            .any(|v| matches!(v, FieldViolation::WrongType { field, .. } if field == "amount")));
        assert!(violations
            .iter()
            .any(|v| matches!(v, FieldViolation::WrongType { field, .. } if field == "quantity")));
    }

    #[test]
    fn test_check_missing_required() {
        let schema = SchemaDescriptor::parse(&sample_schema()).unwrap();
        let record = json!({ "original_file_name": "a.pdf", "date": "2024-01-02" });
        assert_eq!(
            schema.check(&record),
            Err(vec![FieldViolation::Missing("amount".to_string())])
        );
        assert_eq!(
            schema.check(&json!([1, 2])),
            Err(vec![FieldViolation::NotAnObject])
        );
    }

    #[test]
    fn test_integer_accepts_integral_floats() {
        assert!(FieldKind::Integer.accepts(&json!(3)));
        assert!(FieldKind::Integer.accepts(&json!(3.0)));
        assert!(!FieldKind::Integer.accepts(&json!(3.25)));
        assert!(FieldKind::Number.accepts(&json!(-2)));
        assert!(!FieldKind::Number.accepts(&json!("2")));
    }

    #[test]
    fn test_project_fills_and_drops() {
        let schema = SchemaDescriptor::parse(&sample_schema()).unwrap();
        let record = json!({
            "amount": 3,
            "date": "2024-01-02",
            "original_file_name": "a.pdf",
            "confidence": 0.4
        });
        let projected = schema.project(record.as_object().unwrap());
        let keys: Vec<&str> = projected.keys().map(String::as_str).collect();
        assert_eq!(keys, ["original_file_name", "date", "amount", "quantity", "memo"]);
        assert_eq!(projected["memo"], Value::Null);
        assert!(!projected.contains_key("confidence"));
    }

    proptest::proptest! {
        #[test]
        fn prop_project_yields_declared_keys(
            extra in proptest::collection::btree_map("[a-z_]{1,12}", -1000i64..1000, 0..8)
        ) {
            let schema = SchemaDescriptor::parse(&sample_schema()).unwrap();
            let object: Map<String, Value> = extra
                .into_iter()
                .map(|(key, value)| (key, json!(value)))
                .collect();
            let projected = schema.project(&object);
            let keys: Vec<&str> = projected.keys().map(String::as_str).collect();
            proptest::prop_assert_eq!(
                keys,
                vec!["original_file_name", "date", "amount", "quantity", "memo"]
            );
        }
    }
}
