//! Parse service output into candidate record objects

use crate::error::ExtractorError;
use serde_json::Value;

/// Parse the service's text answer into a list of candidate records.
///
/// An empty array is a valid answer meaning "no transactions". A bare object
/// is treated as a single record. Anything that cannot be read as JSON is a
/// transient error: the call is worth repeating.
pub fn parse_service_response(response: &str) -> Result<Vec<Value>, ExtractorError> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(ExtractorError::Transient("Empty response body".to_string()));
    }

    let json_str = strip_code_fence(trimmed);
    let json: Value = match serde_json::from_str(json_str) {
        Ok(json) => json,
        Err(first_error) => recover_embedded_json(json_str).ok_or_else(|| {
            ExtractorError::Transient(format!("Response is not valid JSON: {}", first_error))
        })?,
    };

    match json {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![json]),
        other => Err(ExtractorError::Transient(format!(
            "Expected a JSON array of records, got: {}",
            other
        ))),
    }
}

/// Remove a surrounding Markdown code fence, if present
fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    // Skip the opening fence line (```json or ```)
    let body = match text.find('\n') {
        Some(newline) => &text[newline + 1..],
        None => return "",
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Find the outermost `[...]` or `{...}` span and try to parse it.
///
/// Models occasionally wrap the JSON in prose ("Here are the transactions:").
fn recover_embedded_json(text: &str) -> Option<Value> {
    let start = text.find(|c: char| c == '[' || c == '{')?;
    let closing = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closing)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
