//! Content ingestion: submission, extraction and analysis
//!
//! Submissions are acknowledged immediately: [`ContentService::submit`]
//! stores a PENDING record and enqueues a content-processing job.
//! [`IngestionPipeline::process`] runs inside that job and takes the item
//! through PROCESSING to COMPLETED. When the queue gives up, the
//! [`ContentJobHandler`] marks the item FAILED.

pub mod analysis;
pub mod extract;
pub mod page;
pub mod sanitize;
pub mod state;

pub use analysis::{AnalysisLimits, Classification, ContentAnalyzer};
pub use extract::{
    CommandDocumentExtractor, ContentExtractor, DocumentExtractor, ExtractedText,
    FfprobeMediaProbe, MediaProbe,
};
pub use page::PageFetcher;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Content, ContentStatus, NewContent, SourceFormat, SourceKind};
use crate::queue::{Job, JobFamily, JobHandler, JobQueue};
use crate::storage::ContentRepository;
use crate::utils::error::ValidationError;
use crate::utils::{parse_http_url, truncate_text};

/// Payload of a content-processing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentJob {
    pub content_id: Uuid,
}

const FALLBACK_TITLE_WORDS: usize = 8;

fn title_from_text(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().take(FALLBACK_TITLE_WORDS).collect();
    truncate_text(&words.join(" "), 80)
}

// ============================================================================
// Submission
// ============================================================================

/// Validates submissions and hands them to the content queue
pub struct ContentService {
    contents: Arc<dyn ContentRepository>,
    queue: Arc<JobQueue>,
}

impl ContentService {
    pub fn new(contents: Arc<dyn ContentRepository>, queue: Arc<JobQueue>) -> Self {
        Self { contents, queue }
    }

    /// Check required fields and derive the source format
    pub fn validate(new: &NewContent) -> std::result::Result<SourceFormat, ValidationError> {
        if new.owner_id.trim().is_empty() {
            return Err(ValidationError::MissingField("owner_id"));
        }

        match new.kind {
            SourceKind::Paste => {
                let has_text = new.text.as_deref().is_some_and(|t| !t.trim().is_empty());
                if !has_text {
                    return Err(ValidationError::MissingField("text"));
                }
                Ok(SourceFormat::PlainText)
            }
            SourceKind::Url => {
                let location = non_blank(new.location.as_deref()).ok_or(ValidationError::MissingField("location"))?;
                if parse_http_url(location).is_none() {
                    return Err(ValidationError::invalid("location", "not an http(s) URL"));
                }
                Ok(SourceFormat::Html)
            }
            SourceKind::Upload => {
                let location = non_blank(new.location.as_deref()).ok_or(ValidationError::MissingField("location"))?;
                new.mime_type
                    .as_deref()
                    .and_then(SourceFormat::from_mime)
                    .or_else(|| SourceFormat::from_path(Path::new(location)))
                    .ok_or_else(|| ValidationError::invalid("location", "unsupported file type"))
            }
        }
    }

    /// Persist a PENDING record, enqueue its processing job and return its id
    #[instrument(skip(self, new), fields(owner = %new.owner_id, kind = %new.kind))]
    pub async fn submit(&self, new: NewContent) -> Result<Uuid> {
        let format = Self::validate(&new)?;
        let mut content = Content::pending(new, format);
        if content.title.trim().is_empty() {
            content.title = default_title(&content);
        }

        self.contents.insert_content(&content).await?;
        self.enqueue(content.id).await?;
        info!(content_id = %content.id, format = %format, "Content submitted");
        Ok(content.id)
    }

    /// Reset a FAILED item to PENDING and enqueue it again
    pub async fn resubmit(&self, id: Uuid) -> Result<()> {
        let mut content = self.get(id).await?;
        state::apply_transition(&mut content, ContentStatus::Pending)?;
        self.contents.update_content(&content).await?;
        self.enqueue(id).await?;
        info!(content_id = %id, "Content resubmitted");
        Ok(())
    }

    /// Current record, including status and last error
    pub async fn get(&self, id: Uuid) -> Result<Content> {
        self.contents
            .get_content(id)
            .await?
            .ok_or_else(|| ValidationError::not_found("content", id).into())
    }

    async fn enqueue(&self, id: Uuid) -> Result<Uuid> {
        Ok(self
            .queue
            .enqueue(JobFamily::ContentProcessing, id.to_string(), &ContentJob { content_id: id })
            .await?)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn default_title(content: &Content) -> String {
    match (content.kind, content.location.as_deref()) {
        (SourceKind::Url, Some(url)) => parse_http_url(url)
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string()),
        (SourceKind::Upload, Some(path)) => Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
            .unwrap_or_else(|| path.to_string()),
        _ => title_from_text(content.raw_text.as_deref().unwrap_or_default()),
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Extracts, analyzes and completes one content item
pub struct IngestionPipeline {
    contents: Arc<dyn ContentRepository>,
    extractor: ContentExtractor,
    analyzer: Arc<ContentAnalyzer>,
}

impl IngestionPipeline {
    pub fn new(
        contents: Arc<dyn ContentRepository>,
        extractor: ContentExtractor,
        analyzer: Arc<ContentAnalyzer>,
    ) -> Self {
        Self {
            contents,
            extractor,
            analyzer,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Content> {
        self.contents
            .get_content(id)
            .await?
            .ok_or_else(|| ValidationError::not_found("content", id).into())
    }

    /// Run extraction and analysis for one item.
    ///
    /// A COMPLETED item is returned untouched. Any hard failure leaves the
    /// item in PROCESSING and is returned for retry accounting.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn process(&self, id: Uuid) -> Result<Content> {
        let mut content = self.load(id).await?;
        if content.is_completed() {
            debug!("Content already completed, skipping");
            return Ok(content);
        }

        state::apply_transition(&mut content, ContentStatus::Processing)?;
        self.contents.update_content(&content).await?;

        let extracted = self.extractor.extract(&content).await?;
        let text = extracted.text;

        let summary = self.analyzer.summarize(&content.title, &text).await?;
        let classification = self.analyzer.classify_or_default(id, &text).await;
        let embedding = self.analyzer.embed(&text).await?;

        // Page titles replace the host-name placeholder set at submission
        if content.title.trim().is_empty() || content.title == default_title(&content) {
            if let Some(title) = extracted.title {
                content.title = title;
            }
        }
        if content.title.trim().is_empty() {
            content.title = title_from_text(&text);
        }
        content.raw_text = Some(text);
        content.compute_hash();
        content.summary = Some(summary);
        content.topics = classification.topics;
        content.keywords = classification.keywords;
        content.sentiment = classification.sentiment;
        content.embedding = embedding;
        if extracted.duration_secs.is_some() {
            content.media_duration_secs = extracted.duration_secs;
        }

        state::apply_transition(&mut content, ContentStatus::Completed)?;
        self.contents.update_content(&content).await?;

        info!(
            topics = content.topics.len(),
            keywords = content.keywords.len(),
            "Content processing completed"
        );
        Ok(content)
    }

    /// Keep the latest error on the record while retries continue
    pub async fn record_error(&self, id: Uuid, error: &str) -> Result<()> {
        let mut content = self.load(id).await?;
        if content.status.is_terminal() {
            return Ok(());
        }
        content.error = Some(error.to_string());
        content.updated_at = chrono::Utc::now();
        self.contents.update_content(&content).await?;
        Ok(())
    }

    /// Terminal failure: the queue has given up on this item
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut content = self.load(id).await?;
        // A failed item keeps the error that first failed it
        if content.status.is_terminal() {
            warn!(content_id = %id, status = %content.status, "Not marking finished content as failed");
            return Ok(());
        }
        state::fail(&mut content, error)?;
        self.contents.update_content(&content).await?;
        error!(content_id = %id, error = %error, "Content processing failed");
        Ok(())
    }
}

// ============================================================================
// Queue handler
// ============================================================================

pub struct ContentJobHandler {
    pipeline: Arc<IngestionPipeline>,
}

impl ContentJobHandler {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl JobHandler for ContentJobHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: ContentJob = job.payload_as()?;
        match self.pipeline.process(payload.content_id).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Err(record_err) = self
                    .pipeline
                    .record_error(payload.content_id, &e.to_string())
                    .await
                {
                    debug!(content_id = %payload.content_id, error = %record_err, "Could not record error");
                }
                Err(e)
            }
        }
    }

    async fn on_exhausted(&self, job: &Job, error: &Error) {
        let Ok(payload) = job.payload_as::<ContentJob>() else {
            error!(job_id = %job.id, "Dead content job has an unreadable payload");
            return;
        };
        if let Err(e) = self
            .pipeline
            .mark_failed(payload.content_id, &error.to_string())
            .await
        {
            error!(content_id = %payload.content_id, error = %e, "Failed to mark content as failed");
        }
    }
}
