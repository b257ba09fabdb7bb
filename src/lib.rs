//! castwave - personal radio from the things you read
//!
//! Users submit material (uploaded files, pasted text, web pages). Each item
//! is extracted, summarized, classified and embedded in the background,
//! then curated into generated radio shows, short knowledge nudges and a
//! personalized feed.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`gateway`] - Chat, speech, embedding and transcription over interchangeable AI providers
//! - [`queue`] - Durable job queue with retry, backoff and per-family worker pools
//! - [`ingestion`] - Content submission, text extraction and analysis
//! - [`shows`] - Show requests and script, music, timing and audio generation
//! - [`curation`] - Periodic recuration, show synthesis, nudges, trending and cleanup
//! - [`scheduler`] - Interval triggers with advisory locks
//! - [`feed`] - Personalized feed ranking
//! - [`storage`] - Repository traits, in-memory store and audio sinks
//! - [`app`] - Composition root wiring everything together
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use castwave::app::Services;
//! use castwave::config::Config;
//! use castwave::models::NewContent;
//! use castwave::queue::JobFamily;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let services = Services::from_config(config)?;
//!     let id = services
//!         .contents
//!         .submit(NewContent::url("listener-1", "https://example.com/article"))
//!         .await?;
//!     services.drain(JobFamily::ContentProcessing).await?;
//!     println!("{:?}", services.contents.get(id).await?.status);
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod curation;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod shows;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::{Services, ServicesBuilder};
    pub use crate::config::Config;
    pub use crate::error::{CastwaveErrorTrait, Error, ErrorCategory, Result};
    pub use crate::gateway::AiGateway;
    pub use crate::models::{
        Content, ContentStatus, KnowledgeNudge, NewContent, RadioShow, ShowStatus, ShowType,
        UserProfile,
    };
    pub use crate::queue::{JobFamily, JobQueue};
    pub use crate::shows::ShowRequest;
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{Content, ContentStatus, NewContent, RadioShow, ShowType};
