//! Crate-wide error type
//!
//! Each subsystem keeps its own `thiserror` enum ([`GatewayError`],
//! [`QueueError`], [`SchedulerError`], [`IngestError`], [`StorageError`],
//! [`ValidationError`]); [`Error`] wraps them so services can use `?` across
//! subsystem boundaries.
//!
//! Queue workers branch on [`CastwaveErrorTrait::is_recoverable`]: a
//! recoverable failure is rescheduled with backoff, anything else dead-letters
//! the job on the spot. [`ErrorCategory`] is the label attached to logs and
//! metrics.
//!
//! ```rust,ignore
//! use castwave::error::{CastwaveErrorTrait, Error};
//!
//! fn disposition(err: &Error) -> &'static str {
//!     if err.is_recoverable() { "retry" } else { "dead" }
//! }
//! ```

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::gateway::error::GatewayError;
pub use crate::queue::error::QueueError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{IngestError, StorageError, ValidationError};

/// Retry and labelling hooks shared by every error enum in the crate
pub trait CastwaveErrorTrait: std::error::Error {
    /// Whether a job that failed with this error should run again
    fn is_recoverable(&self) -> bool;

    fn category(&self) -> ErrorCategory;
}

/// Coarse error label for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Timeouts, 5xx replies and rate limits
    Network,
    /// A provider answered but the answer was unusable
    Llm,
    /// Bad input or a reference to unprocessed content
    Validation,
    /// Raw text could not be obtained from a source
    Extraction,
    Storage,
    Queue,
    Config,
    Scheduler,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Llm => "llm",
            Self::Validation => "validation",
            Self::Extraction => "extraction",
            Self::Storage => "storage",
            Self::Queue => "queue",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("ingest: {0}")]
    Ingest(#[from] IngestError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    /// Prompt template failed to register or render
    #[error("template: {0}")]
    Template(String),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl CastwaveErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_recoverable(),
            Self::Queue(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Ingest(e) => e.is_recoverable(),
            Self::Storage(e) => e.is_recoverable(),
            Self::Validation(_) => false,
            Self::Io(_) | Self::Http(_) => true,
            Self::Template(_) | Self::Json(_) | Self::Config(_) | Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Gateway(e) => e.category(),
            Self::Queue(_) => ErrorCategory::Queue,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Ingest(_) => ErrorCategory::Extraction,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Template(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Json(_) => ErrorCategory::Other,
            Self::Http(_) => ErrorCategory::Network,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True when the caller supplied bad input; never retried
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
