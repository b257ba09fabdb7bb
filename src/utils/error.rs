//! Error types shared by the ingestion, show and storage layers

use crate::error::{CastwaveErrorTrait, ErrorCategory};
use crate::models::{ContentStatus, ShowType};
use thiserror::Error;
use uuid::Uuid;

/// Rejected input or a reference to data that is not ready. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Required field absent or blank
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// Field present but unusable
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Show generation referenced content that has not finished processing
    #[error("content {id} is not completed (status: {status})")]
    ContentNotCompleted { id: Uuid, status: ContentStatus },

    /// Auto-select found nothing to build a show from
    #[error("no completed content available for a {0} show")]
    NoEligibleContent(ShowType),

    /// Content status change outside the allowed lifecycle
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: ContentStatus,
        to: ContentStatus,
    },
}

impl ValidationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl CastwaveErrorTrait for ValidationError {
    fn is_recoverable(&self) -> bool {
        false
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Errors raised while turning source material into text
#[derive(Error, Debug)]
pub enum IngestError {
    /// No extractor exists for the detected format
    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    /// Extraction produced no usable text
    #[error("extracted text is empty")]
    EmptyText,

    /// Page could not be fetched
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Page answered with a client error such as 404 or 410
    #[error("{url} answered HTTP {status}")]
    PageRejected { url: String, status: u16 },

    /// Page body is larger than the configured limit
    #[error("{url} is larger than {limit} bytes")]
    PageTooLarge { url: String, limit: usize },

    /// External tool (pdftotext, unzip, ffprobe) failed
    #[error("{tool} failed: {reason}")]
    Tool { tool: String, reason: String },

    /// Bytes could not be decoded to text
    #[error("decoding error: {0}")]
    Decode(String),

    /// Uploaded file could not be read
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
}

impl IngestError {
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

impl CastwaveErrorTrait for IngestError {
    fn is_recoverable(&self) -> bool {
        // Extraction failures count against the retry budget; only inputs that
        // can never succeed are dead-lettered at once.
        !matches!(
            self,
            Self::UnsupportedFormat(_) | Self::PageRejected { .. } | Self::PageTooLarge { .. }
        )
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch { .. } | Self::PageRejected { .. } | Self::PageTooLarge { .. } => {
                ErrorCategory::Network
            }
            _ => ErrorCategory::Extraction,
        }
    }
}

/// Entity repository errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Update or delete of a missing record
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Insert of a record whose key already exists
    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: String },

    /// Backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl CastwaveErrorTrait for StorageError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}
