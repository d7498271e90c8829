//! Extraction client: one batch in, validated transaction records out

use crate::batcher::Batch;
use crate::config::PipelineSettings;
use crate::error::ExtractorError;
use crate::parser::parse_service_response;
use crate::prompt::{render_batch_content, PromptTemplate};
use crate::retry::RetryPolicy;
use finscribe_domain::{GenerationProvider, RetryClass, SchemaDescriptor, TransactionRecord};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A record the service returned that did not pass validation.
///
/// Carries enough context (batch, files, position) to reprocess by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRejection {
    /// Batch the record came from
    pub batch_index: usize,
    /// Identifiers of the source files in that batch
    pub files: Vec<String>,
    /// Position of the record in the service's answer
    pub position: usize,
    /// Why it was dropped
    pub reason: String,
    /// The record as returned
    pub record: Value,
}

/// A service call that failed transiently and was retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// 1-based attempt number
    pub attempt: u32,
    /// Error reported for the attempt
    pub error: String,
    /// Backoff waited before the next attempt
    pub delay: Duration,
}

/// Outcome of a successful batch extraction
#[derive(Debug, Clone, PartialEq)]
pub struct BatchExtraction {
    /// Batch the records belong to
    pub batch_index: usize,
    /// Validated records, in the order the service returned them
    pub records: Vec<TransactionRecord>,
    /// Records dropped by validation
    pub rejected: Vec<RecordRejection>,
    /// Transient failures that preceded the successful call
    pub failed_attempts: Vec<FailedAttempt>,
}

impl BatchExtraction {
    /// Number of service calls made, including the successful one
    pub fn attempts(&self) -> u32 {
        self.failed_attempts.len() as u32 + 1
    }
}

enum AttemptError {
    Transient(String),
    Fatal(String),
}

/// Sends batches to a generation service and validates what comes back.
///
/// A batch is retried as a whole on transient failure, following the
/// [`RetryPolicy`]. Records are checked one by one: a bad record is dropped
/// and logged, it never fails the batch.
pub struct ExtractionClient<P>
where
    P: GenerationProvider,
{
    provider: Arc<P>,
    schema: Arc<SchemaDescriptor>,
    template: Arc<PromptTemplate>,
    field_list: String,
    file_identifier_field: String,
    retry: RetryPolicy,
}

impl<P> ExtractionClient<P>
where
    P: GenerationProvider,
{
    /// Create a client from resolved settings
    pub fn new(provider: P, settings: &PipelineSettings) -> Self {
        Self::with_shared_provider(Arc::new(provider), settings)
    }

    /// Create a client around a provider that is shared elsewhere
    pub fn with_shared_provider(provider: Arc<P>, settings: &PipelineSettings) -> Self {
        Self {
            provider,
            field_list: settings.schema.field_list(),
            schema: Arc::clone(&settings.schema),
            template: Arc::clone(&settings.template),
            file_identifier_field: settings.file_identifier_field.clone(),
            retry: settings.retry,
        }
    }

    /// The underlying provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Retry policy in effect
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Render the prompt for a batch
    pub fn build_prompt(&self, batch: &Batch<'_>) -> String {
        self.template
            .render(&self.field_list, &render_batch_content(batch))
    }

    /// Extract validated records from one batch.
    ///
    /// Fails with [`ExtractorError::BatchFailed`] once every attempt has been
    /// spent on transient errors, or immediately on a non-transient one.
    /// Fails with [`ExtractorError::Cancelled`] if `cancel` fires, including
    /// while waiting between attempts.
    pub async fn extract(
        &self,
        batch: &Batch<'_>,
        cancel: &CancellationToken,
    ) -> Result<BatchExtraction, ExtractorError> {
        let prompt = self.build_prompt(batch);
        let files = batch.file_identifiers();
        let max_attempts = self.retry.max_attempts();
        let mut failed_attempts: Vec<FailedAttempt> = Vec::new();

        debug!("Batch {} prompt length: {} chars", batch.index, prompt.len());

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ExtractorError::Cancelled),
                outcome = self.attempt(&prompt) => outcome,
            };

            let error = match outcome {
                Ok(items) => {
                    let (records, rejected) = self.validate(batch, &files, items);
                    info!(
                        "Batch {} extracted: {} accepted, {} rejected, {} attempt(s)",
                        batch.index,
                        records.len(),
                        rejected.len(),
                        attempt
                    );
                    return Ok(BatchExtraction {
                        batch_index: batch.index,
                        records,
                        rejected,
                        failed_attempts,
                    });
                }
                Err(AttemptError::Fatal(reason)) => {
                    warn!("Batch {} attempt {} failed permanently: {}", batch.index, attempt, reason);
                    return Err(ExtractorError::BatchFailed {
                        batch_index: batch.index,
                        files,
                        attempts: attempt,
                        backoff: total_backoff(&failed_attempts),
                        reason,
                    });
                }
                Err(AttemptError::Transient(reason)) => reason,
            };

            if attempt >= max_attempts {
                warn!(
                    "Batch {} attempt {}/{} failed: {}. Max retries reached",
                    batch.index, attempt, max_attempts, error
                );
                return Err(ExtractorError::BatchFailed {
                    batch_index: batch.index,
                    files,
                    attempts: attempt,
                    backoff: total_backoff(&failed_attempts),
                    reason: error,
                });
            }

            let delay = self.retry.delay_before_retry(attempt);
            warn!(
                "Batch {} attempt {}/{} failed: {}. Retrying in {:.2?}",
                batch.index, attempt, max_attempts, error, delay
            );
            failed_attempts.push(FailedAttempt {
                attempt,
                error,
                delay,
            });

            tokio::select! {
                _ = cancel.cancelled() => return Err(ExtractorError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One service call plus response parsing
    async fn attempt(&self, prompt: &str) -> Result<Vec<Value>, AttemptError> {
        let text = self
            .provider
            .generate_structured(prompt, self.schema.service_schema())
            .await
            .map_err(|e| {
                if e.is_transient() {
                    AttemptError::Transient(e.to_string())
                } else {
                    AttemptError::Fatal(e.to_string())
                }
            })?;

        debug!("Service response length: {} chars", text.len());

        parse_service_response(&text).map_err(|e| AttemptError::Transient(e.to_string()))
    }

    /// Check each returned object, keep the valid ones in order
    fn validate(
        &self,
        batch: &Batch<'_>,
        files: &[String],
        items: Vec<Value>,
    ) -> (Vec<TransactionRecord>, Vec<RecordRejection>) {
        let mut records = Vec::with_capacity(items.len());
        let mut rejected = Vec::new();

        for (position, item) in items.into_iter().enumerate() {
            match self.validate_one(batch, &item) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    warn!(
                        "Dropping record {} of batch {} (files: {}): {}",
                        position,
                        batch.index,
                        files.join(", "),
                        reason
                    );
                    rejected.push(RecordRejection {
                        batch_index: batch.index,
                        files: files.to_vec(),
                        position,
                        reason,
                        record: item,
                    });
                }
            }
        }

        (records, rejected)
    }

    fn validate_one(&self, batch: &Batch<'_>, item: &Value) -> Result<TransactionRecord, String> {
        let field = self.file_identifier_field.as_str();
        let mut object: Map<String, Value> = item
            .as_object()
            .cloned()
            .ok_or_else(|| "record is not a JSON object".to_string())?;

        // A single-source batch can only have come from that source
        let echoed = object.get(field).filter(|v| !v.is_null()).cloned();
        if echoed.is_none() {
            if let [only] = batch.sources {
                object.insert(field.to_string(), Value::String(only.file_identifier.clone()));
            }
        }

        let candidate = Value::Object(object);
        self.schema.check(&candidate).map_err(|violations| {
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        })?;
        let Value::Object(object) = candidate else {
            return Err("record is not a JSON object".to_string());
        };

        let source = match object.get(field) {
            Some(Value::String(claimed)) => resolve_source(batch, claimed)
                .ok_or_else(|| format!("'{}' names a file outside this batch: '{}'", field, claimed))?,
            Some(Value::Null) | None => {
                return Err(format!("missing file identifier field '{}'", field));
            }
            Some(other) => {
                return Err(format!("file identifier field '{}' is not a string: {}", field, other));
            }
        };

        let mut fields = self.schema.project(&object);
        fields.insert(field.to_string(), Value::String(source.to_string()));
        Ok(TransactionRecord::from_fields(fields))
    }
}

/// Match an echoed file identifier against the batch's sources
fn total_backoff(failed_attempts: &[FailedAttempt]) -> Duration {
    failed_attempts.iter().map(|failed| failed.delay).sum()
}

fn resolve_source<'a>(batch: &Batch<'a>, claimed: &str) -> Option<&'a str> {
    let sources = batch.sources;
    sources
        .iter()
        .find(|s| s.file_identifier == claimed)
        .or_else(|| {
            let wanted = claimed.trim().to_lowercase();
            sources
                .iter()
                .find(|s| s.file_identifier.trim().to_lowercase() == wanted)
        })
        .map(|s| s.file_identifier.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use finscribe_domain::SourceText;
    use finscribe_llm::{LlmError, MockProvider};
    use serde_json::json;

    fn settings(max_retries: u32) -> PipelineSettings {
        let schema = json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "original_file_name": { "type": "STRING" },
                    "date": { "type": "STRING" },
                    "amount": { "type": "NUMBER" },
                    "memo": { "type": "STRING" }
                },
                "required": ["original_file_name", "amount"]
            }
        });
        PipelineSettings {
            batch_size: 2,
            retry: RetryPolicy::new(max_retries, Duration::from_millis(5)),
            schema: Arc::new(SchemaDescriptor::parse(&schema).unwrap()),
            template: Arc::new(PromptTemplate::parse("Fields: {fields}\n{content}").unwrap()),
            file_identifier_field: "original_file_name".to_string(),
            failure_policy: FailurePolicy::Abort,
            link_field: "drive_link".to_string(),
        }
    }

    fn two_sources() -> Vec<SourceText> {
        vec![
            SourceText::new("a.pdf", "Invoice total 10"),
            SourceText::new("b.pdf", "Receipt 20"),
        ]
    }

    #[tokio::test]
    async fn test_prompt_contains_fields_and_labelled_files() {
        let provider = MockProvider::new("[]");
        let client = ExtractionClient::new(provider.clone(), &settings(0));
        let sources = two_sources();
        let batch = Batch { index: 0, sources: &sources };

        client.extract(&batch, &CancellationToken::new()).await.unwrap();

        let prompt = &provider.prompts()[0];
        assert!(prompt.starts_with("Fields: original_file_name, date, amount, memo\n"));
        assert!(prompt.contains("--- File: a.pdf ---\n\nInvoice total 10"));
        assert!(prompt.contains("--- File: b.pdf ---\n\nReceipt 20"));
        assert_eq!(provider.last_schema().unwrap()["type"], "ARRAY");
    }

    #[tokio::test]
    async fn test_one_valid_one_missing_required() {
        let provider = MockProvider::new(
            r#"[
                {"original_file_name": "a.pdf", "amount": 10, "date": "2024-01-01"},
                {"original_file_name": "b.pdf", "date": "2024-01-02"}
            ]"#,
        );
        let client = ExtractionClient::new(provider, &settings(0));
        let sources = two_sources();
        let batch = Batch { index: 4, sources: &sources };

        let result = client.extract(&batch, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source("original_file_name"), Some("a.pdf"));
        assert_eq!(result.rejected.len(), 1);
        let rejection = &result.rejected[0];
        assert_eq!(rejection.batch_index, 4);
        assert_eq!(rejection.position, 1);
        assert_eq!(rejection.files, vec!["a.pdf", "b.pdf"]);
        assert!(rejection.reason.contains("amount"));
    }

    #[tokio::test]
    async fn test_records_are_projected_onto_schema() {
        let provider = MockProvider::new(
            r#"[{"amount": 10, "original_file_name": "a.pdf", "confidence": "high"}]"#,
        );
        let client = ExtractionClient::new(provider, &settings(0));
        let sources = two_sources();
        let batch = Batch { index: 0, sources: &sources };

        let result = client.extract(&batch, &CancellationToken::new()).await.unwrap();
        let keys: Vec<&str> = result.records[0].fields().keys().map(String::as_str).collect();
        assert_eq!(keys, ["original_file_name", "date", "amount", "memo"]);
        assert_eq!(result.records[0].get("memo"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_provenance_resolution() {
        let provider = MockProvider::new(
            r#"[
                {"original_file_name": " B.PDF ", "amount": 1},
                {"original_file_name": "c.pdf", "amount": 2},
                {"amount": 3}
            ]"#,
        );
        let client = ExtractionClient::new(provider, &settings(0));
        let sources = two_sources();
        let batch = Batch { index: 0, sources: &sources };

        let result = client.extract(&batch, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source("original_file_name"), Some("b.pdf"));
        assert_eq!(result.rejected.len(), 2);
        assert!(result.rejected[0].reason.contains("outside this batch"));
    }

    #[tokio::test]
    async fn test_single_source_batch_tags_missing_identifier() {
        let provider = MockProvider::new(r#"[{"amount": 3}]"#);
        let client = ExtractionClient::new(provider, &settings(0));
        let sources = vec![SourceText::new("only.png", "Paid 3")];
        let batch = Batch { index: 0, sources: &sources };

        let result = client.extract(&batch, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].source("original_file_name"), Some("only.png"));
    }

    #[tokio::test]
    async fn test_retries_transient_failures_with_backoff() {
        let provider = MockProvider::new(r#"[{"original_file_name": "a.pdf", "amount": 1}]"#);
        provider.push_result(Err(LlmError::RateLimitExceeded("quota".into())));
        provider.push_result(Ok("not json at all".into()));
        let client = ExtractionClient::new(provider.clone(), &settings(2));
        let sources = two_sources();
        let batch = Batch { index: 0, sources: &sources };

        let result = client.extract(&batch, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.attempts(), 3);
        assert_eq!(provider.call_count(), 3);
        let delays: Vec<Duration> = result.failed_attempts.iter().map(|f| f.delay).collect();
        assert_eq!(delays, vec![Duration::from_millis(5), Duration::from_millis(10)]);
        assert_eq!(result.failed_attempts[0].attempt, 1);
        assert_eq!(result.failed_attempts[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_batch() {
        let provider = MockProvider::new("[]");
        for _ in 0..3 {
            provider.push_result(Err(LlmError::Communication("reset".into())));
        }
        let client = ExtractionClient::new(provider.clone(), &settings(2));
        let sources = two_sources();
        let batch = Batch { index: 7, sources: &sources };

        let err = client.extract(&batch, &CancellationToken::new()).await.unwrap_err();
        match err {
            ExtractorError::BatchFailed { batch_index, files, attempts, backoff, reason } => {
                assert_eq!(batch_index, 7);
                assert_eq!(files, vec!["a.pdf", "b.pdf"]);
                assert_eq!(attempts, 3);
                assert_eq!(backoff, client.retry_policy().delay_before_retry(1) * 3);
                assert!(reason.contains("reset"));
            }
            other => panic!("Expected BatchFailed, got {:?}", other),
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let provider = MockProvider::new("[]");
        provider.push_result(Err(LlmError::Authentication("bad key".into())));
        let client = ExtractionClient::new(provider.clone(), &settings(5));
        let sources = two_sources();
        let batch = Batch { index: 0, sources: &sources };

        let err = client.extract(&batch, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExtractorError::BatchFailed { attempts: 1, .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let provider = MockProvider::new("[]");
        provider.push_result(Err(LlmError::Communication("reset".into())));
        let mut slow = settings(3);
        slow.retry = RetryPolicy::new(3, Duration::from_secs(3600));
        let client = ExtractionClient::new(provider.clone(), &slow);
        let sources = two_sources();
        let batch = Batch { index: 0, sources: &sources };

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = client.extract(&batch, &cancel).await.unwrap_err();
        assert!(matches!(err, ExtractorError::Cancelled));
        assert_eq!(provider.call_count(), 1);
    }
}
