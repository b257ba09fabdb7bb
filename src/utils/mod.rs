//! Text helpers shared by ingestion, shows and the feed, plus the named lock
//! table, backoff schedule and domain error enums

pub mod error;
pub mod lock;
pub mod retry;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Decode raw bytes into a UTF-8 string.
///
/// A byte-order mark wins; otherwise strict UTF-8 is tried and anything that
/// fails falls back to Windows-1252, which maps every byte.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (cow, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return cow.into_owned();
    }

    let (cow, had_errors) = UTF_8.decode_without_bom_handling(bytes);
    if !had_errors {
        return cow.into_owned();
    }

    let (cow, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    cow.into_owned()
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Parse a string as an absolute http(s) URL
pub fn parse_http_url(input: &str) -> Option<Url> {
    let parsed = Url::parse(input.trim()).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed),
        _ => None,
    }
}

/// Truncate text to at most `max_chars` characters, appending "..." when cut
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// Whitespace-delimited word count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
