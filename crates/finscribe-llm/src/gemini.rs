//! Gemini Provider Implementation
//!
//! Sends schema-constrained `generateContent` requests to the Gemini API.
//! The response schema is passed as `generationConfig.responseSchema` with
//! `responseMimeType = application/json`, so the service itself is asked to
//! return a JSON array of records.
//!
//! # Examples
//!
//! ```no_run
//! use finscribe_llm::GeminiProvider;
//!
//! let provider = GeminiProvider::new("api-key", "gemini-2.0-flash")
//!     .unwrap()
//!     .with_max_output_tokens(8192);
//! ```

use crate::LlmError;
use async_trait::async_trait;
use finscribe_domain::GenerationProvider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default Gemini API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default timeout for a single request (2 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Gemini API provider
pub struct GeminiProvider {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
    max_output_tokens: Option<u32>,
}

/// Request body for the generateContent API
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

/// Response from the generateContent API
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    ///
    /// # Parameters
    ///
    /// - `api_key`: API key sent as the `x-goog-api-key` header
    /// - `model`: Model to use (e.g., "gemini-2.0-flash" or "models/gemini-2.0-flash")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            max_output_tokens: None,
        })
    }

    /// Use a different API base URL (proxies, regional endpoints, tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = build_client(timeout)?;
        Ok(self)
    }

    /// Cap the number of tokens the model may generate
    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Full URL of the generateContent method for the configured model
    pub fn url(&self) -> String {
        let model = if self.model.starts_with("models/") || self.model.starts_with("tunedModels/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!("{}/{}:generateContent", self.endpoint.trim_end_matches('/'), model)
    }

    async fn send(&self, prompt: &str, schema: &Value) -> Result<String, LlmError> {
        let request_body = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, &body, &self.model));
        }

        let parsed = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        candidate_text(parsed)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    type Error = LlmError;

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String, LlmError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending generateContent request");
        self.send(prompt, schema).await
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Other(format!("Failed to build HTTP client: {}", e)))
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(e.to_string())
    } else {
        LlmError::Communication(format!("Request failed: {}", e))
    }
}

/// Map a non-success HTTP status to an error of the right retry class
fn status_error(status: reqwest::StatusCode, body: &str, model: &str) -> LlmError {
    use reqwest::StatusCode;

    let detail = format!("HTTP {}: {}", status, body.trim());
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimitExceeded(detail),
        StatusCode::REQUEST_TIMEOUT => LlmError::Timeout(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(detail),
        StatusCode::NOT_FOUND => LlmError::ModelNotAvailable(model.to_string()),
        s if s.is_server_error() => LlmError::Communication(detail),
        _ => LlmError::InvalidRequest(detail),
    }
}

/// Pull the generated text out of the first candidate
fn candidate_text(response: GenerateContentResponse) -> Result<String, LlmError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let feedback = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(LlmError::InvalidResponse(format!("Empty response: {}", feedback)));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse(format!(
            "Candidate has no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}
