//! Pulling a JSON object out of free-form completion text.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use ambient_core::CompletionError;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap());

/// The JSON object in `text`: the body of a ```json fence if present,
/// otherwise the span from the first `{` to the last `}`.
pub fn extract_object(text: &str) -> Option<&str> {
    if let Some(body) = FENCED.captures(text).and_then(|c| c.get(1)) {
        return Some(body.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parse the JSON object embedded in a completion.
pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> Result<T, CompletionError> {
    let body = extract_object(text)
        .ok_or_else(|| CompletionError::MalformedResponse("no JSON object in response".into()))?;
    serde_json::from_str(body).map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON: {e}")))
}
