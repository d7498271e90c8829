//! Prompt templates for transaction extraction

use crate::batcher::Batch;
use crate::error::ExtractorError;

/// Separator written after each source text in a batch
const SOURCE_SEPARATOR_WIDTH: usize = 80;

/// Built-in template used when the configuration does not provide one
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a meticulous bookkeeping assistant.
The text below was extracted from one or more financial documents (receipts,
invoices, bank statements, transfer confirmations). Each document starts with a
header of the form "--- File: <name> ---".

Identify every individual financial transaction and return one JSON object per
transaction with these fields: {fields}.

Rules:
- Copy the file name from the header of the document the transaction appears in
  exactly as written into the file name field. Never invent or shorten it.
- One object per transaction; a document may contain none, one or many.
- Use numbers for amounts, without currency symbols or thousands separators.
- Use ISO 8601 dates (YYYY-MM-DD) when a date can be determined.
- If no transactions are present, return an empty array.

Documents:
{content}"#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Fields,
    Content,
}

/// A prompt with a `{fields}` and a `{content}` substitution point.
///
/// `{{` and `}}` render as literal braces. A brace that does not open a
/// `{name}` marker is kept as-is, so JSON examples inside a template need no
/// escaping. Substituted text is never scanned for markers.
///
/// # Examples
///
/// ```
/// use finscribe_extractor::PromptTemplate;
///
/// let template = PromptTemplate::parse("Fields: {fields}\n{{literal}}\n{content}").unwrap();
/// let prompt = template.render("date, amount", "{fields} stays as text");
/// assert_eq!(prompt, "Fields: date, amount\n{literal}\n{fields} stays as text");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template, requiring both markers and rejecting unknown ones
    pub fn parse(template: &str) -> Result<Self, ExtractorError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            if rest.starts_with("{{") {
                literal.push('{');
                rest = &rest[2..];
                continue;
            }
            if rest.starts_with("}}") {
                literal.push('}');
                rest = &rest[2..];
                continue;
            }
            if c == '{' {
                if let Some(end) = rest.find('}') {
                    let name = &rest[1..end];
                    if is_marker_name(name) {
                        let segment = match name {
                            "fields" => Segment::Fields,
                            "content" => Segment::Content,
                            other => {
                                return Err(ExtractorError::Config(format!(
                                    "prompt template has unknown placeholder '{{{}}}'",
                                    other
                                )))
                            }
                        };
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        segments.push(segment);
                        rest = &rest[end + 1..];
                        continue;
                    }
                }
            }
            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (segment, marker) in [(Segment::Fields, "{fields}"), (Segment::Content, "{content}")] {
            if !segments.contains(&segment) {
                return Err(ExtractorError::Config(format!(
                    "prompt template is missing the {} marker",
                    marker
                )));
            }
        }

        Ok(Self { segments })
    }

    /// Render the template. Pure; called once per batch.
    pub fn render(&self, fields: &str, content: &str) -> String {
        let mut prompt = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => prompt.push_str(text),
                Segment::Fields => prompt.push_str(fields),
                Segment::Content => prompt.push_str(content),
            }
        }
        prompt
    }
}

fn is_marker_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Concatenate a batch's texts, each labelled with its file identifier
pub fn render_batch_content(batch: &Batch<'_>) -> String {
    let separator = "=".repeat(SOURCE_SEPARATOR_WIDTH);
    let mut content = String::new();
    for source in batch.sources {
        content.push_str(&format!("--- File: {} ---\n\n", source.file_identifier));
        content.push_str(&source.text);
        content.push_str(&format!("\n\n{}\n\n", separator));
    }
    content
}
