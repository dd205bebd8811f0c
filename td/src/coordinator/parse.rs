//! Best-effort JSON extraction from an LLM text response, for the
//! structured per-phase response schemas (`Plan`, `Reflection`,
//! `VerificationResult`, ...). Models wrap JSON in prose or markdown code
//! fences often enough that a bare `serde_json::from_str` on the whole
//! response is not reliable.

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("LLM response had no text content")]
    Empty,
    #[error("no JSON object found in response")]
    NoJson,
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Extract and deserialize the first JSON object found in `text`.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let candidate = extract_json_block(text).ok_or(ParseError::NoJson)?;
    serde_json::from_str(candidate).map_err(ParseError::from)
}

/// Find the outermost `{...}` block, preferring the contents of a ```json
/// fence when one is present.
fn extract_json_block(text: &str) -> Option<&str> {
    let search_from = text.find("```json").map(|i| i + "```json".len()).or_else(|| text.find("```").map(|i| i + 3)).unwrap_or(0);
    let relative_start = text[search_from..].find('{')?;
    let start = search_from + relative_start;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
