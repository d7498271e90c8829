//! Finscribe LLM Provider Layer
//!
//! Implementations of the `GenerationProvider` trait from `finscribe-domain`.
//!
//! # Providers
//!
//! - `GeminiProvider`: Schema-constrained generation through the Gemini
//!   `generateContent` API
//! - `MockProvider`: Deterministic mock for testing
//!
//! Providers send exactly one request per call. Whether a failure is worth
//! retrying is reported through [`RetryClass`]; the retry loop itself belongs
//! to the extraction client.
//!
//! # Examples
//!
//! ```
//! use finscribe_llm::MockProvider;
//! use finscribe_domain::GenerationProvider;
//! use serde_json::json;
//!
//! # async fn example() {
//! let provider = MockProvider::new("[]");
//! let result = provider.generate_structured("test prompt", &json!({})).await.unwrap();
//! assert_eq!(result, "[]");
//! # }
//! ```

#![warn(missing_docs)]

pub mod gemini;

use async_trait::async_trait;
use finscribe_domain::{GenerationProvider, RetryClass};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub use gemini::GeminiProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Invalid, empty or unexpected response from the service
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit or quota exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Credentials rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The service refused the request as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

impl RetryClass for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Communication(_)
                | LlmError::Timeout(_)
                | LlmError::InvalidResponse(_)
                | LlmError::RateLimitExceeded(_)
        )
    }
}

type Handler = Arc<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Mock LLM provider for deterministic testing
///
/// Returns pre-configured responses without making any network calls.
/// Responses are resolved in this order:
///
/// 1. Scripted results queued with [`MockProvider::push_result`], one per call
/// 2. Exact-prompt responses added with [`MockProvider::add_response`]
/// 3. The handler installed with [`MockProvider::with_handler`]
/// 4. The default response
///
/// # Examples
///
/// ```
/// use finscribe_llm::{LlmError, MockProvider};
/// use finscribe_domain::GenerationProvider;
/// use serde_json::json;
///
/// # async fn example() {
/// let provider = MockProvider::new("[]");
/// provider.push_result(Err(LlmError::RateLimitExceeded("quota".into())));
///
/// assert!(provider.generate_structured("p", &json!({})).await.is_err());
/// assert_eq!(provider.generate_structured("p", &json!({})).await.unwrap(), "[]");
/// assert_eq!(provider.call_count(), 2);
/// # }
/// ```
#[derive(Clone)]
pub struct MockProvider {
    model: String,
    default_response: String,
    responses: Arc<Mutex<HashMap<String, String>>>,
    scripted: Arc<Mutex<VecDeque<Result<String, LlmError>>>>,
    handler: Option<Handler>,
    prompts: Arc<Mutex<Vec<String>>>,
    last_schema: Arc<Mutex<Option<Value>>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            model: "mock".to_string(),
            default_response: response.into(),
            responses: Arc::new(Mutex::new(HashMap::new())),
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            handler: None,
            prompts: Arc::new(Mutex::new(Vec::new())),
            last_schema: Arc::new(Mutex::new(None)),
        }
    }

    /// Compute responses from the prompt
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Add a specific response for a given prompt
    pub fn add_response(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        lock(&self.responses).insert(prompt.into(), response.into());
    }

    /// Queue a result for the next call that has not consumed one yet
    pub fn push_result(&self, result: Result<String, LlmError>) {
        lock(&self.scripted).push_back(result);
    }

    /// Get the number of times the provider was called
    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Schema passed with the most recent call
    pub fn last_schema(&self) -> Option<Value> {
        lock(&self.last_schema).clone()
    }

    /// Reset the recorded calls
    pub fn reset_call_count(&self) {
        lock(&self.prompts).clear();
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("[]")
    }
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("model", &self.model)
            .field("default_response", &self.default_response)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

#[async_trait]
impl GenerationProvider for MockProvider {
    type Error = LlmError;

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String, LlmError> {
        lock(&self.prompts).push(prompt.to_string());
        *lock(&self.last_schema) = Some(schema.clone());

        if let Some(result) = lock(&self.scripted).pop_front() {
            return result;
        }

        if let Some(response) = lock(&self.responses).get(prompt) {
            return Ok(response.clone());
        }

        if let Some(handler) = &self.handler {
            return handler(prompt);
        }

        Ok(self.default_response.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
