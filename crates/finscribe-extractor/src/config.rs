//! Configuration for the extraction pipeline
//!
//! [`PipelineConfig`] mirrors the TOML file one-to-one. It is resolved once,
//! before any component runs, into an immutable [`PipelineSettings`] that is
//! passed explicitly to the components that need it.

use crate::error::ExtractorError;
use crate::prompt::{PromptTemplate, DEFAULT_EXTRACTION_PROMPT};
use crate::retry::RetryPolicy;
use finscribe_domain::{FieldKind, SchemaDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Placeholder shipped in sample configuration files
const API_KEY_PLACEHOLDER: &str = "YOUR_GEMINI_API_KEY";

/// What the orchestrator does when a batch fails terminally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run; everything committed before the failed batch stays persisted
    #[default]
    Abort,
    /// Record the failure, commit the batch as skipped (no records) and continue
    Skip,
}

/// Response schema as written in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSchema {
    /// A JSON document stored in a string
    Json(String),
    /// An inline TOML table
    Inline(Value),
}

impl RawSchema {
    /// Parse into a JSON value
    pub fn to_value(&self) -> Result<Value, ExtractorError> {
        match self {
            RawSchema::Json(text) => serde_json::from_str(text).map_err(|e| {
                ExtractorError::Config(format!("response_schema is not valid JSON: {}", e))
            }),
            RawSchema::Inline(value) => Ok(value.clone()),
        }
    }
}

/// Raw pipeline configuration, as read from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of source files per batch
    #[serde(default = "default_combination_count")]
    pub combination_count: i64,

    /// Credential for the generation service
    #[serde(default)]
    pub api_key: String,

    /// Service model identifier
    pub model_name: String,

    /// Retries after the first attempt of a batch
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Delay before the first retry, in seconds; doubles on every retry
    #[serde(default = "default_initial_delay")]
    pub initial_delay: f64,

    /// Record schema sent to the service and used for validation
    pub response_schema: RawSchema,

    /// Prompt template with `{fields}` and `{content}` markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_extraction_prompt: Option<String>,

    /// Base URL of the generation API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timeout for one HTTP request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Record field carrying the originating file identifier
    #[serde(default = "default_file_identifier_field")]
    pub file_identifier_field: String,

    /// Behaviour on terminal batch failure
    #[serde(default)]
    pub on_batch_failure: FailurePolicy,

    /// Record field that receives the source document link, when links are loaded
    #[serde(default = "default_link_field")]
    pub link_field: String,
}

fn default_combination_count() -> i64 {
    1
}

fn default_max_retries() -> i64 {
    3
}

fn default_initial_delay() -> f64 {
    2.0
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_file_identifier_field() -> String {
    "original_file_name".to_string()
}

fn default_link_field() -> String {
    "drive_link".to_string()
}

/// Validated, immutable settings shared by every component of a run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Source files per batch (at least 1)
    pub batch_size: usize,
    /// Retry and backoff policy for service calls
    pub retry: RetryPolicy,
    /// Typed record schema
    pub schema: Arc<SchemaDescriptor>,
    /// Parsed prompt template
    pub template: Arc<PromptTemplate>,
    /// Record field carrying the originating file identifier
    pub file_identifier_field: String,
    /// Behaviour on terminal batch failure
    pub failure_policy: FailurePolicy,
    /// Record field for source document links
    pub link_field: String,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ExtractorError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExtractorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ExtractorError> {
        toml::from_str(toml_str)
            .map_err(|e| ExtractorError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, ExtractorError> {
        toml::to_string_pretty(self)
            .map_err(|e| ExtractorError::Config(format!("Failed to serialize to TOML: {}", e)))
    }

    /// API key with surrounding whitespace and quotes removed
    pub fn api_key(&self) -> &str {
        self.api_key.trim().trim_matches(|c| c == '"' || c == '\'')
    }

    /// Per-request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate every option and build the immutable run settings
    pub fn resolve(&self) -> Result<PipelineSettings, ExtractorError> {
        if self.combination_count < 1 {
            return Err(ExtractorError::Config(format!(
                "combination_count must be at least 1 (got {})",
                self.combination_count
            )));
        }
        let batch_size = usize::try_from(self.combination_count).map_err(|_| {
            ExtractorError::Config("combination_count is too large".to_string())
        })?;

        let api_key = self.api_key();
        if api_key.is_empty() || api_key.contains(API_KEY_PLACEHOLDER) {
            return Err(ExtractorError::Config("api_key is missing".to_string()));
        }
        if self.model_name.trim().is_empty() {
            return Err(ExtractorError::Config("model_name is missing".to_string()));
        }

        let max_retries = u32::try_from(self.max_retries).map_err(|_| {
            ExtractorError::Config(format!(
                "max_retries must be a non-negative integer (got {})",
                self.max_retries
            ))
        })?;
        if !self.initial_delay.is_finite() || self.initial_delay <= 0.0 {
            return Err(ExtractorError::Config(format!(
                "initial_delay must be a positive number of seconds (got {})",
                self.initial_delay
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ExtractorError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.file_identifier_field.trim().is_empty() {
            return Err(ExtractorError::Config(
                "file_identifier_field must not be empty".to_string(),
            ));
        }

        let schema = SchemaDescriptor::parse(&self.response_schema.to_value()?)?;
        match schema.field(&self.file_identifier_field) {
            Some(field) if field.kind == FieldKind::String => {}
            Some(field) => {
                return Err(ExtractorError::Config(format!(
                    "response_schema declares '{}' as {}; the file identifier must be a STRING",
                    field.name,
                    field.kind.as_str()
                )));
            }
            None => {
                return Err(ExtractorError::Config(format!(
                    "response_schema must declare the file identifier field '{}'",
                    self.file_identifier_field
                )));
            }
        }
        let template = PromptTemplate::parse(
            self.financial_extraction_prompt
                .as_deref()
                .unwrap_or(DEFAULT_EXTRACTION_PROMPT),
        )?;

        Ok(PipelineSettings {
            batch_size,
            retry: RetryPolicy::new(max_retries, Duration::from_secs_f64(self.initial_delay)),
            schema: Arc::new(schema),
            template: Arc::new(template),
            file_identifier_field: self.file_identifier_field.clone(),
            failure_policy: self.on_batch_failure,
            link_field: self.link_field.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
combination_count = 3
api_key = " 'secret-key' "
model_name = "gemini-2.0-flash"
max_retries = 2
initial_delay = 0.5
response_schema = '''
{
  "type": "ARRAY",
  "items": {
    "type": "OBJECT",
    "properties": {
      "original_file_name": { "type": "STRING" },
      "amount": { "type": "NUMBER" }
    },
    "required": ["original_file_name", "amount"]
  }
}
'''
"#;

    fn sample() -> PipelineConfig {
        PipelineConfig::from_toml(SAMPLE).unwrap()
    }

    #[test]
    fn test_sample_config_resolves() {
        let config = sample();
        assert_eq!(config.api_key(), "secret-key");
        assert_eq!(config.on_batch_failure, FailurePolicy::Abort);
        assert_eq!(config.file_identifier_field, "original_file_name");

        let settings = config.resolve().unwrap();
        assert_eq!(settings.batch_size, 3);
        assert_eq!(settings.retry.max_retries, 2);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(settings.schema.field_list(), "original_file_name, amount");
        assert_eq!(settings.link_field, "drive_link");
    }

    #[test]
    fn test_inline_schema_table() {
        let toml_str = r#"
api_key = "k"
model_name = "m"
on_batch_failure = "skip"

[response_schema]
type = "ARRAY"

[response_schema.items]
type = "OBJECT"
required = ["amount"]

[response_schema.items.properties.original_file_name]
type = "STRING"

[response_schema.items.properties.amount]
type = "NUMBER"
"#;
        let config = PipelineConfig::from_toml(toml_str).unwrap();
        assert!(matches!(config.response_schema, RawSchema::Inline(_)));
        assert_eq!(config.on_batch_failure, FailurePolicy::Skip);

        let settings = config.resolve().unwrap();
        assert_eq!(settings.batch_size, 1);
        assert!(settings.schema.field("amount").unwrap().required);
    }

    #[test]
    fn test_invalid_batch_size() {
        for count in [0, -2] {
            let mut config = sample();
            config.combination_count = count;
            assert!(config.resolve().unwrap_err().is_config());
        }
    }

    #[test]
    fn test_missing_or_placeholder_api_key() {
        let mut config = sample();
        config.api_key = String::new();
        assert!(config.resolve().unwrap_err().is_config());

        config.api_key = "\"YOUR_GEMINI_API_KEY\"".to_string();
        assert!(config.resolve().unwrap_err().is_config());
    }

    #[test]
    fn test_invalid_retry_settings() {
        let mut config = sample();
        config.max_retries = -1;
        assert!(config.resolve().is_err());

        let mut config = sample();
        config.initial_delay = 0.0;
        assert!(config.resolve().is_err());

        let mut config = sample();
        config.initial_delay = f64::NAN;
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_malformed_schema_is_config_error() {
        let mut config = sample();
        config.response_schema = RawSchema::Json("{ not json".to_string());
        assert!(config.resolve().unwrap_err().is_config());

        config.response_schema = RawSchema::Json(r#"{"type":"ARRAY","items":{}}"#.to_string());
        assert!(config.resolve().unwrap_err().is_config());
    }

    #[test]
    fn test_schema_must_declare_file_identifier() {
        let mut config = sample();
        config.response_schema = RawSchema::Json(
            r#"{"type":"ARRAY","items":{"type":"OBJECT","properties":{"amount":{"type":"NUMBER"}}}}"#
                .to_string(),
        );
        let err = config.resolve().unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("'original_file_name'"));

        config.response_schema = RawSchema::Json(
            r#"{"type":"ARRAY","items":{"type":"OBJECT","properties":{"original_file_name":{"type":"INTEGER"}}}}"#
                .to_string(),
        );
        assert!(config.resolve().unwrap_err().is_config());

        let mut config = sample();
        config.file_identifier_field = "source".to_string();
        assert!(config.resolve().unwrap_err().is_config());
    }

    #[test]
    fn test_missing_required_key_fails_to_parse() {
        let result = PipelineConfig::from_toml("api_key = \"k\"\n");
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_template_without_markers_rejected() {
        let mut config = sample();
        config.financial_extraction_prompt = Some("Extract everything.".to_string());
        assert!(config.resolve().unwrap_err().is_config());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = sample();
        let toml_str = config.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.combination_count, parsed.combination_count);
        assert_eq!(config.model_name, parsed.model_name);
        assert_eq!(config.response_schema, parsed.response_schema);
    }
}
