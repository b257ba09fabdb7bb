//! Text cleanup applied to every extracted source before analysis
//!
//! Extracted text from pages, documents and transcripts is normalized with
//! the same steps: invisible characters and control characters dropped,
//! entities decoded, whitespace collapsed per line, runs of blank lines
//! limited to one.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid whitespace regex"));

static MULTI_NEWLINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// Sanitize extracted text
///
/// ```
/// use castwave::ingestion::sanitize::sanitize_text;
///
/// let clean = sanitize_text("Hello\u{200B} World  \n\n\n\nNext &amp; last");
/// assert_eq!(clean, "Hello World\n\nNext & last");
/// ```
pub fn sanitize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = remove_invisible(&text);
    let text = html_escape::decode_html_entities(&text);
    let text = WHITESPACE_REGEX.replace_all(&text, " ");
    let text = trim_lines(&text);
    MULTI_NEWLINE_REGEX
        .replace_all(&text, "\n\n")
        .trim()
        .to_string()
}

/// Drop zero-width characters, BOMs and control characters other than
/// newline and tab
pub fn remove_invisible(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\u{200B}'..='\u{200F}' | '\u{2028}'..='\u{202F}' | '\u{FEFF}'))
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

pub fn trim_lines(text: &str) -> String {
    text.lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

/// Remove markup from an XML or HTML fragment, leaving its text
pub fn strip_tags(markup: &str) -> String {
    TAG_REGEX.replace_all(markup, " ").into_owned()
}
