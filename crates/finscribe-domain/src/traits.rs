//! Trait definitions for external interactions
//!
//! These traits define the boundary between the extraction pipeline and the
//! generation service. Implementations live in `finscribe-llm`.

use async_trait::async_trait;
use serde_json::Value;

/// Classifies an error as worth retrying or not.
pub trait RetryClass {
    /// `true` when the same request may succeed if sent again later
    /// (network failure, throttling, malformed body).
    fn is_transient(&self) -> bool;
}

/// A generation service that can be asked for output constrained to a schema.
///
/// Implementations perform exactly one request per call. Retrying is the
/// caller's policy, not the provider's.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Error type for provider operations
    type Error: RetryClass + std::fmt::Display + Send + Sync + 'static;

    /// Model identifier used for logging and reporting
    fn model_name(&self) -> &str;

    /// Generate text for `prompt`, asking the service to conform to `schema`.
    ///
    /// Returns the raw text of the service's answer, which is expected to be a
    /// JSON document but is not parsed here.
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String, Self::Error>;
}
