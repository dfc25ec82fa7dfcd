//! Extraction of JSON payloads from free-form model output.
//!
//! Models tend to wrap JSON in prose or markdown fences, so both helpers
//! locate the bracketed block first and only then parse it.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static RE_LIST_SHORTEST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*?\]").unwrap());
static RE_LIST_LONGEST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*\]").unwrap());
static RE_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(\{.*\}|\[.*\])").unwrap());

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No JSON array found in model output")]
    NoArray,

    #[error("No JSON found in model output")]
    NoJson,

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Expected a JSON array of strings, found {0}")]
    NotStringList(String),
}

/// Parses the first JSON array of strings in `raw`.
///
/// The shortest bracketed block is tried first; when that is not valid JSON
/// (nested brackets inside an item) the longest block is used instead. Items
/// are trimmed and blank ones dropped. An empty array is valid.
pub fn extract_list(raw: &str) -> Result<Vec<String>, ParseError> {
    let shortest = RE_LIST_SHORTEST.find(raw).ok_or(ParseError::NoArray)?;

    let value: serde_json::Value = match serde_json::from_str(shortest.as_str()) {
        Ok(value) => value,
        Err(first_err) => match RE_LIST_LONGEST.find(raw) {
            Some(longest) if longest.as_str() != shortest.as_str() => {
                serde_json::from_str(longest.as_str())?
            }
            _ => return Err(ParseError::InvalidJson(first_err)),
        },
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        other => return Err(ParseError::NotStringList(other.to_string())),
    };

    let mut names = Vec::with_capacity(items.len());
    for item in items {
        match item {
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    names.push(trimmed.to_string());
                }
            }
            other => return Err(ParseError::NotStringList(other.to_string())),
        }
    }
    Ok(names)
}

/// Parses the outermost `{...}` or `[...]` block in `raw`.
pub fn extract_json(raw: &str) -> Result<serde_json::Value, ParseError> {
    let block = RE_JSON.find(raw).ok_or(ParseError::NoJson)?;
    Ok(serde_json::from_str(block.as_str())?)
}
