//! Web page fetching and main-text extraction
//!
//! Pages are fetched with rate limiting and retry, and their bodies are
//! capped at a configured size. A body is decoded using the charset from the
//! `Content-Type` header (falling back to byte sniffing) and reduced to
//! readable text with navigation, headers, footers, scripts, styles and
//! asides removed.

use std::sync::LazyLock;
use std::time::Duration;

use encoding_rs::Encoding;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};

use super::sanitize::sanitize_text;
use crate::gateway::{build_rate_limiter, DirectRateLimiter};
use crate::utils::decode_text;
use crate::utils::error::IngestError;
use crate::utils::retry::{retry_transient, Backoff};

const DEFAULT_USER_AGENT: &str = concat!("castwave/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_MAX_PAGE_BYTES: usize = 5 * 1024 * 1024;

/// Elements whose whole subtree is boilerplate
const SKIPPED_ELEMENTS: &[&str] = &[
    "nav", "header", "footer", "script", "style", "aside", "noscript", "form", "iframe", "svg",
    "template", "button",
];

/// Elements that end a line of text
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "main", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5",
    "h6", "br", "blockquote", "pre", "tr", "table", "figcaption",
];

macro_rules! selector {
    ($s:expr) => {
        LazyLock::new(|| Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s)))
    };
}

static MAIN_SELECTOR: LazyLock<Selector> = selector!("article, main, [role=main]");
static BODY_SELECTOR: LazyLock<Selector> = selector!("body");
static TITLE_SELECTOR: LazyLock<Selector> = selector!("title");
static OG_TITLE_SELECTOR: LazyLock<Selector> = selector!(r#"meta[property="og:title"]"#);
static H1_SELECTOR: LazyLock<Selector> = selector!("h1");

/// Title and readable body of a page
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub title: Option<String>,
    pub text: String,
}

/// Extract the title and main text of an HTML document
pub fn extract_page_text(html: &str) -> PageText {
    let document = Html::parse_document(html);

    let title = document
        .select(&OG_TITLE_SELECTOR)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(str::to_string)
        .or_else(|| document.select(&TITLE_SELECTOR).next().map(element_text))
        .or_else(|| document.select(&H1_SELECTOR).next().map(element_text))
        .map(|t| sanitize_text(&t))
        .filter(|t| !t.is_empty());

    let root = document
        .select(&MAIN_SELECTOR)
        .next()
        .or_else(|| document.select(&BODY_SELECTOR).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(root, &mut raw);

    PageText {
        title,
        text: sanitize_text(&raw),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if SKIPPED_ELEMENTS.contains(&name) {
                continue;
            }
            collect_text(child_element, out);
            if BLOCK_ELEMENTS.contains(&name) {
                out.push('\n');
            }
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

/// Decode a response body using the declared charset, if any
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let declared = content_type
        .and_then(|ct| {
            ct.split(';')
                .map(str::trim)
                .find_map(|part| part.strip_prefix("charset="))
        })
        .and_then(|label| Encoding::for_label(label.trim_matches('"').as_bytes()));

    match declared {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => decode_text(bytes),
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// HTTP fetcher for URL submissions
pub struct PageFetcher {
    client: Client,
    rate_limiter: Option<DirectRateLimiter>,
    retry: Backoff,
    max_body_bytes: usize,
}

impl PageFetcher {
    pub fn new(timeout: Duration, requests_per_second: Option<u32>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| IngestError::Fetch {
                url: String::new(),
                reason: format!("client setup: {e}"),
            })?;

        Ok(Self {
            client,
            rate_limiter: build_rate_limiter(requests_per_second),
            retry: Backoff::new(2, 500, 5_000),
            max_body_bytes: DEFAULT_MAX_PAGE_BYTES,
        })
    }

    pub fn with_retry(mut self, retry: Backoff) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Fetch a page and extract its readable text
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<PageText, IngestError> {
        let html = retry_transient(&self.retry, || self.fetch_once(url), is_retryable).await?;
        let page = extract_page_text(&html.body);
        debug!(chars = page.text.len(), "Extracted page text");
        Ok(page)
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedBody, FetchFailure> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT))
            .header(
                ACCEPT,
                HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.5"),
            )
            .send()
            .await
            .map_err(|e| FetchFailure::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status {
                url: url.to_string(),
                status,
            });
        }
        let too_large = || FetchFailure::TooLarge {
            url: url.to_string(),
            limit: self.max_body_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(too_large());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Content-Length may be absent or wrong, so the stream is capped too
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchFailure::transport(url, e))?
        {
            if bytes.len() + chunk.len() > self.max_body_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedBody {
            body: decode_body(&bytes, content_type.as_deref()),
        })
    }
}

struct FetchedBody {
    body: String,
}

#[derive(Debug)]
enum FetchFailure {
    Transport { url: String, reason: String },
    Status { url: String, status: StatusCode },
    TooLarge { url: String, limit: usize },
}

impl FetchFailure {
    fn transport(url: &str, err: reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    /// Client errors other than timeouts and throttling will not change on retry
    fn is_rejection(status: StatusCode) -> bool {
        status.is_client_error()
            && status != StatusCode::TOO_MANY_REQUESTS
            && status != StatusCode::REQUEST_TIMEOUT
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport { url, reason } => write!(f, "{url}: {reason}"),
            Self::Status { url, status } => write!(f, "{url}: HTTP {status}"),
            Self::TooLarge { url, limit } => write!(f, "{url}: body over {limit} bytes"),
        }
    }
}

impl From<FetchFailure> for IngestError {
    fn from(failure: FetchFailure) -> Self {
        match failure {
            FetchFailure::Status { url, status } if FetchFailure::is_rejection(status) => {
                IngestError::PageRejected {
                    url,
                    status: status.as_u16(),
                }
            }
            FetchFailure::Status { url, status } => IngestError::Fetch {
                url,
                reason: format!("HTTP {status}"),
            },
            FetchFailure::Transport { url, reason } => IngestError::Fetch { url, reason },
            FetchFailure::TooLarge { url, limit } => IngestError::PageTooLarge { url, limit },
        }
    }
}

/// Transport errors, rate limiting and server errors are retried
fn is_retryable(failure: &FetchFailure) -> bool {
    match failure {
        FetchFailure::Transport { .. } => true,
        FetchFailure::Status { status, .. } => !FetchFailure::is_rejection(*status),
        FetchFailure::TooLarge { .. } => false,
    }
}
