//! Recovery of a JSON object from provider text.

use serde_json::Value;

use fixit_core::{Error, Result};

const PREVIEW_CHARS: usize = 200;

/// Parse provider text into a JSON object.
///
/// Tries, in order: the text as-is, the text with code fences stripped, and
/// the first complete object starting at the first `{` (trailing text is
/// ignored). Anything else is malformed output.
pub fn parse_structured(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::malformed_output("empty response"));
    }

    if let Some(value) = parse_object(trimmed) {
        return Ok(value);
    }

    let cleaned = strip_fences(trimmed);
    if let Some(value) = parse_object(&cleaned) {
        tracing::debug!("Recovered JSON after stripping code fences");
        return Ok(value);
    }

    if let Some(value) = first_object(&cleaned) {
        tracing::debug!("Recovered first JSON object from mixed output");
        return Ok(value);
    }

    let preview: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    tracing::error!(preview = %preview, "Provider output is not recoverable JSON");
    Err(Error::malformed_output(format!("no JSON object in response: {}", preview)))
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok().filter(Value::is_object)
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```JSON", "").replace("```", "").trim().to_string()
}

fn first_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
        .filter(Value::is_object)
}
