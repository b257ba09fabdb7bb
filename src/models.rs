// Core data structures for the castwave pipeline

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

// ============================================================================
// Content
// ============================================================================

/// How a piece of content entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Upload,
    Paste,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Paste => "paste",
            Self::Url => "url",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concrete format of the source material, used to pick an extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    PlainText,
    Html,
    Pdf,
    Docx,
    Pptx,
    Audio,
    Video,
}

impl SourceFormat {
    /// Detect the format from a MIME type
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match mime.as_str() {
            "text/plain" | "text/markdown" | "text/csv" => Some(Self::PlainText),
            "text/html" | "application/xhtml+xml" => Some(Self::Html),
            "application/pdf" => Some(Self::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Docx)
            }
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                Some(Self::Pptx)
            }
            m if m.starts_with("audio/") => Some(Self::Audio),
            m if m.starts_with("video/") => Some(Self::Video),
            _ => None,
        }
    }

    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "md" | "markdown" | "csv" => Some(Self::PlainText),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "mp3" | "wav" | "m4a" | "ogg" | "flac" | "aac" => Some(Self::Audio),
            "mp4" | "mov" | "mkv" | "webm" | "avi" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing lifecycle of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Allowed transitions.
    ///
    /// `Processing -> Processing` covers re-delivery of an in-flight job and
    /// `Failed -> Pending` is the explicit re-submit path. Nothing reaches a
    /// terminal state without passing through `Processing`.
    pub fn can_transition_to(self, next: ContentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown content status '{other}'")),
        }
    }
}

/// Overall tone detected by classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Lenient parse; anything unrecognized is neutral
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Self::Positive,
            "negative" | "neg" => Self::Negative,
            _ => Self::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// Input for a new content submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContent {
    pub owner_id: String,
    pub kind: SourceKind,
    pub title: Option<String>,
    /// Pasted text (required for `Paste`)
    pub text: Option<String>,
    /// File path for uploads, URL for scraped pages
    pub location: Option<String>,
    pub mime_type: Option<String>,
}

impl NewContent {
    /// Pasted text submission
    pub fn paste(owner_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind: SourceKind::Paste,
            title: None,
            text: Some(text.into()),
            location: None,
            mime_type: None,
        }
    }

    /// Uploaded file submission
    pub fn upload(owner_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind: SourceKind::Upload,
            title: None,
            text: None,
            location: Some(path.into()),
            mime_type: None,
        }
    }

    /// Scraped URL submission
    pub fn url(owner_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind: SourceKind::Url,
            title: None,
            text: None,
            location: Some(url.into()),
            mime_type: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// One ingested unit of user material and its derived analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub owner_id: String,
    pub kind: SourceKind,
    pub format: SourceFormat,
    pub location: Option<String>,
    pub mime_type: Option<String>,
    pub title: String,
    pub raw_text: Option<String>,
    pub summary: Option<String>,
    pub topics: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub sentiment: Sentiment,
    pub embedding: Vec<f32>,
    pub media_duration_secs: Option<f64>,
    pub content_hash: Option<String>,
    pub status: ContentStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Content {
    /// Build a PENDING record from a submission whose format is already known
    pub fn pending(new: NewContent, format: SourceFormat) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            kind: new.kind,
            format,
            location: new.location,
            mime_type: new.mime_type,
            title: new.title.unwrap_or_default(),
            raw_text: new.text,
            summary: None,
            topics: BTreeSet::new(),
            keywords: BTreeSet::new(),
            sentiment: Sentiment::Neutral,
            embedding: Vec::new(),
            media_duration_secs: None,
            content_hash: None,
            status: ContentStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    /// Calculate content hash of the extracted text using SHA256
    pub fn compute_hash(&mut self) {
        if let Some(text) = &self.raw_text {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            self.content_hash = Some(format!("{:x}", hasher.finalize()));
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ContentStatus::Completed
    }
}

// ============================================================================
// Curation
// ============================================================================

/// Derived metadata attached to a completed content item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationRecord {
    pub content_id: Uuid,
    pub category: String,
    pub tags: BTreeSet<String>,
    pub embedding: Vec<f32>,
    pub relevance: f64,
    pub refreshed_at: DateTime<Utc>,
}

impl CurationRecord {
    /// Relevance every freshly curated record starts from
    pub const BASELINE_RELEVANCE: f64 = 1.0;

    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.refreshed_at > max_age
    }
}

// ============================================================================
// Shows
// ============================================================================

/// Format of a generated show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowType {
    News,
    Talk,
    Music,
    Knowledge,
    Mixed,
    QuickHits,
    DeepDive,
}

impl ShowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Talk => "talk",
            Self::Music => "music",
            Self::Knowledge => "knowledge",
            Self::Mixed => "mixed",
            Self::QuickHits => "quick_hits",
            Self::DeepDive => "deep_dive",
        }
    }

    /// Human-readable label used in titles and prompts
    pub fn label(&self) -> &'static str {
        match self {
            Self::News => "News Roundup",
            Self::Talk => "Talk Show",
            Self::Music => "Music Hour",
            Self::Knowledge => "Knowledge Hour",
            Self::Mixed => "Mixed Bag",
            Self::QuickHits => "Quick Hits",
            Self::DeepDive => "Deep Dive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "news" => Some(Self::News),
            "talk" => Some(Self::Talk),
            "music" => Some(Self::Music),
            "knowledge" => Some(Self::Knowledge),
            "mixed" => Some(Self::Mixed),
            "quick_hits" | "quickhits" => Some(Self::QuickHits),
            "deep_dive" | "deepdive" => Some(Self::DeepDive),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::News,
            Self::Talk,
            Self::Music,
            Self::Knowledge,
            Self::Mixed,
            Self::QuickHits,
            Self::DeepDive,
        ]
    }

    /// Number of content items picked in auto-select mode
    pub fn auto_select_count(&self) -> usize {
        match self {
            Self::QuickHits => 1,
            Self::DeepDive => 3,
            _ => 5,
        }
    }

    /// Number of music tracks mixed into the show
    pub fn music_track_count(&self) -> usize {
        match self {
            Self::Music => 4,
            Self::Mixed => 2,
            Self::Talk => 1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for ShowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowStatus {
    Generating,
    Ready,
    Failed,
}

impl ShowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "GENERATING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        }
    }

    /// READY and FAILED shows are never mutated again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for ShowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A generated, scripted, timed audio program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioShow {
    pub id: Uuid,
    /// `None` marks a global/broadcast show
    pub owner_id: Option<String>,
    pub title: String,
    pub show_type: ShowType,
    pub script: Option<String>,
    pub audio_ref: Option<String>,
    pub duration_secs: u32,
    pub content_ids: Vec<Uuid>,
    pub music_track_ids: Vec<String>,
    pub status: ShowStatus,
    pub error: Option<String>,
    pub played_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RadioShow {
    /// New show record waiting for the generation job
    pub fn generating(
        owner_id: Option<String>,
        title: impl Into<String>,
        show_type: ShowType,
        content_ids: Vec<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            show_type,
            script: None,
            audio_ref: None,
            duration_secs: 0,
            content_ids,
            music_track_ids: Vec::new(),
            status: ShowStatus::Generating,
            error: None,
            played_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_global(&self) -> bool {
        self.owner_id.is_none()
    }
}

// ============================================================================
// Nudges, users and music
// ============================================================================

/// A short standalone fact extracted from one content item for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNudge {
    pub id: Uuid,
    pub user_id: String,
    pub text: String,
    pub category: String,
    pub content_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeNudge {
    pub fn new(
        user_id: impl Into<String>,
        text: impl Into<String>,
        category: impl Into<String>,
        content_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            text: text.into(),
            category: category.into(),
            content_id,
            created_at: Utc::now(),
        }
    }
}

/// Listener preferences read by curation and feed ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub preferred_topics: BTreeSet<String>,
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    #[serde(default)]
    pub preferred_formats: BTreeSet<ShowType>,
    #[serde(default = "nudges_on")]
    pub nudges_enabled: bool,
    #[serde(default)]
    pub liked_content_ids: BTreeSet<Uuid>,
}

fn nudges_on() -> bool {
    true
}

/// Nudges are opt-out: a listener with no stored profile gets them
impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            preferred_topics: BTreeSet::new(),
            preferred_genres: Vec::new(),
            preferred_formats: BTreeSet::new(),
            nudges_enabled: nudges_on(),
            liked_content_ids: BTreeSet::new(),
        }
    }
}

impl UserProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_topics = topics.into_iter().map(|t| normalize_label(&t.into())).collect();
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nudges(mut self, enabled: bool) -> Self {
        self.nudges_enabled = enabled;
        self
    }

    pub fn has_preferences(&self) -> bool {
        !self.preferred_topics.is_empty()
    }
}

/// Track descriptor returned by the music recommendation source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_secs: u32,
    pub genre: String,
}

/// Canonical form for topics, tags and categories
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
