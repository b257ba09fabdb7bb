//! Tolerant JSON extraction from model replies
//!
//! Models wrap JSON in prose or markdown fences more often than not. These
//! helpers pull the payload out before handing it to serde.

use super::error::{GatewayError, GatewayResult};
use serde::de::DeserializeOwned;

/// Extract the JSON payload from a reply.
///
/// Order of preference: a ```json fence, any fenced block, the outermost
/// `{...}` object, the outermost `[...]` array, then the trimmed text itself.
pub fn extract_json(text: &str) -> &str {
    // Try to find JSON in code block
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    // Try to find JSON in generic code block
    if let Some(start) = text.find("```") {
        let after_start = &text[start + 3..];
        // Skip language identifier if present
        let content_start = after_start.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(end) = after_start[content_start..].find("```") {
            return after_start[content_start..content_start + end].trim();
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if end > start {
                return &text[start..=end];
            }
        }
    }

    text.trim()
}

/// Extract and deserialize a JSON reply, attributing failures to `provider`
pub fn parse_json<T: DeserializeOwned>(provider: &str, text: &str) -> GatewayResult<T> {
    let payload = extract_json(text);
    serde_json::from_str(payload).map_err(|e| {
        tracing::debug!(
            provider = provider,
            reply = %crate::utils::truncate_text(text, 200),
            "Unparseable JSON reply"
        );
        GatewayError::invalid_response(provider, format!("malformed JSON: {e}"))
    })
}
