//! Reading the text-extraction stage's output.

use crate::error::{CliError, Result};
use finscribe_domain::SourceText;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Header the text-extraction stage writes before each file's text
const HEADER_PREFIX: &str = "--- File: ";
const HEADER_SUFFIX: &str = " ---";

/// Load source texts from a directory of `*.txt` files or a JSON object.
///
/// A directory is read in file-name order. A `.txt` file that opens with
/// `--- File: <name> ---` headers holds one source per header, identified by
/// `<name>`; any other `.txt` file is one source identified by its stem, so
/// `receipt.pdf.txt` becomes `receipt.pdf`. For a JSON file, the object's
/// keys are the identifiers, in the order they appear.
pub fn load_sources(path: &Path) -> Result<Vec<SourceText>> {
    let sources = if path.is_dir() {
        load_directory(path)?
    } else {
        load_json(path)?
    };

    if sources.is_empty() {
        return Err(CliError::InvalidInput(format!(
            "no source texts found in {}",
            path.display()
        )));
    }
    Ok(sources)
}

fn load_directory(dir: &Path) -> Result<Vec<SourceText>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sources = Vec::new();
    for path in paths {
        let text = fs::read_to_string(&path)?;
        if let Some(sections) = split_sections(&text) {
            sources.extend(sections);
            continue;
        }
        let Some(identifier) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        sources.push(SourceText::new(identifier, text));
    }
    Ok(sources)
}

fn header_name(line: &str) -> Option<&str> {
    let name = line
        .trim()
        .strip_prefix(HEADER_PREFIX)?
        .strip_suffix(HEADER_SUFFIX)?
        .trim();
    (!name.is_empty()).then_some(name)
}

/// Split a combined file into one source per header.
///
/// Returns `None` unless the first non-blank line is a header.
fn split_sections(text: &str) -> Option<Vec<SourceText>> {
    let first = text.lines().find(|line| !line.trim().is_empty())?;
    header_name(first)?;

    let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
    for line in text.lines() {
        if let Some(name) = header_name(line) {
            sections.push((name.to_string(), Vec::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push(line);
        }
    }

    let sources = sections
        .into_iter()
        .map(|(name, body)| SourceText::new(name, section_text(&body)))
        .collect();
    Some(sources)
}

/// Section body without surrounding blank lines or the closing `====` rule
fn section_text(body: &[&str]) -> String {
    let mut lines = body;
    while let Some((last, rest)) = lines.split_last() {
        let last = last.trim();
        if last.is_empty() || (last.len() >= 3 && last.chars().all(|c| c == '=')) {
            lines = rest;
        } else {
            break;
        }
    }
    while let Some((first, rest)) = lines.split_first() {
        if first.trim().is_empty() {
            lines = rest;
        } else {
            break;
        }
    }
    lines.join("\n")
}

fn load_json(path: &Path) -> Result<Vec<SourceText>> {
    let contents = fs::read_to_string(path)?;
    let texts: Map<String, Value> = serde_json::from_str(&contents).map_err(|e| {
        CliError::InvalidInput(format!(
            "{} must be a JSON object mapping file name to text: {}",
            path.display(),
            e
        ))
    })?;

    texts
        .into_iter()
        .map(|(identifier, text)| match text {
            Value::String(text) => Ok(SourceText::new(identifier, text)),
            other => Err(CliError::InvalidInput(format!(
                "text for '{}' must be a string, got {}",
                identifier, other
            ))),
        })
        .collect()
}
