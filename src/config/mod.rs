//! Configuration management for castwave
//!
//! Configuration comes from a TOML file or from `CASTWAVE_*` environment
//! variables, falling back to defaults for anything not given, and is
//! checked by [`Config::validate`] before services are built.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::feed::FeedWeights;
use crate::gateway::GatewayConfig;
use crate::models::ShowType;
use crate::queue::{JobFamily, JobPolicy};
use crate::scheduler::TriggerConfig;
use crate::utils::retry::Backoff;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub queue: QueueConfig,
    pub ingestion: IngestionConfig,
    pub shows: ShowsConfig,
    pub curation: CurationConfig,
    pub scheduler: TriggerConfig,
    pub feed: FeedWeights,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Worker and retry settings for one job family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Hard per-attempt timeout; none when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub lease_secs: u64,
}

impl FamilyConfig {
    fn from_policy(policy: &JobPolicy, workers: usize) -> Self {
        Self {
            workers,
            max_attempts: policy.max_attempts,
            backoff_base_ms: policy.backoff.base.as_millis() as u64,
            backoff_max_ms: policy.backoff.cap.as_millis() as u64,
            timeout_secs: policy.timeout.map(|t| t.as_secs()),
            lease_secs: policy.lease.as_secs(),
        }
    }

    pub fn policy(&self) -> JobPolicy {
        JobPolicy {
            max_attempts: self.max_attempts,
            backoff: Backoff::new(
                self.max_attempts.saturating_sub(1),
                self.backoff_base_ms,
                self.backoff_max_ms,
            ),
            timeout: self.timeout_secs.map(Duration::from_secs),
            lease: Duration::from_secs(self.lease_secs),
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub poll_interval_ms: u64,
    pub content_processing: FamilyConfig,
    pub show_generation: FamilyConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            content_processing: FamilyConfig::from_policy(&JobPolicy::content_processing(), 4),
            show_generation: FamilyConfig::from_policy(&JobPolicy::show_generation(), 2),
        }
    }
}

impl QueueConfig {
    pub fn family(&self, family: JobFamily) -> &FamilyConfig {
        match family {
            JobFamily::ContentProcessing => &self.content_processing,
            JobFamily::ShowGeneration => &self.show_generation,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Extraction and analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub page_timeout_secs: u64,
    pub page_requests_per_second: Option<u32>,
    /// Retries after a transient page fetch failure
    pub page_retries: u32,
    /// Largest page body read before the fetch is abandoned
    pub max_page_bytes: usize,
    /// Base directory for relative upload paths
    pub upload_root: Option<PathBuf>,
    /// Characters of source text sent to the model
    pub max_input_chars: usize,
    pub pdftotext_path: String,
    pub unzip_path: String,
    pub ffprobe_path: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 30,
            page_requests_per_second: Some(2),
            page_retries: 2,
            max_page_bytes: 5 * 1024 * 1024,
            upload_root: None,
            max_input_chars: 12_000,
            pdftotext_path: "pdftotext".to_string(),
            unzip_path: "unzip".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Show generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowsConfig {
    /// Directory for synthesized audio; no audio is produced when absent
    pub audio_dir: Option<PathBuf>,
}

impl Default for ShowsConfig {
    fn default() -> Self {
        Self {
            audio_dir: Some(PathBuf::from("data/audio")),
        }
    }
}

/// Curation engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Curation records older than this are recomputed
    pub max_age_hours: i64,
    /// Items recurated per pass
    pub batch_size: usize,
    /// Show types synthesized per user per pass
    pub show_types: Vec<ShowType>,
    pub nudges_per_user: usize,
    pub trending_window_hours: i64,
    pub trending_top_n: usize,
    pub like_weight: f64,
    pub max_likes: usize,
    pub trending_weight: f64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            batch_size: 50,
            show_types: vec![ShowType::News, ShowType::QuickHits],
            nudges_per_user: 3,
            trending_window_hours: 72,
            trending_top_n: 20,
            like_weight: 0.5,
            max_likes: 10,
            trending_weight: 0.25,
        }
    }
}

impl CurationConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age_hours)
    }

    pub fn trending_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.trending_window_hours)
    }
}

/// Storage locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite job queue database; in-memory queue when absent
    pub queue_db_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            queue_db_path: Some(PathBuf::from("data/queue.db")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Defaults overridden by `CASTWAVE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var("CASTWAVE_DEFAULT_PROVIDER") {
            config.gateway.default_provider = provider;
        }
        if let Ok(fallback) = std::env::var("CASTWAVE_FALLBACK_PROVIDER") {
            config.gateway.fallback_provider = Some(fallback).filter(|f| !f.is_empty());
        }
        if let Some(dimensions) = env_parse::<usize>("CASTWAVE_EMBEDDING_DIMENSIONS") {
            config.gateway.embedding_dimensions = dimensions;
        }

        config.queue.poll_interval_ms =
            env_parse("CASTWAVE_POLL_INTERVAL_MS").unwrap_or(config.queue.poll_interval_ms);
        config.queue.content_processing.workers = env_parse("CASTWAVE_CONTENT_WORKERS")
            .unwrap_or(config.queue.content_processing.workers);
        config.queue.show_generation.workers =
            env_parse("CASTWAVE_SHOW_WORKERS").unwrap_or(config.queue.show_generation.workers);

        config.ingestion.page_timeout_secs =
            env_parse("CASTWAVE_PAGE_TIMEOUT").unwrap_or(config.ingestion.page_timeout_secs);
        config.ingestion.page_retries =
            env_parse("CASTWAVE_PAGE_RETRIES").unwrap_or(config.ingestion.page_retries);
        config.ingestion.max_page_bytes =
            env_parse("CASTWAVE_MAX_PAGE_BYTES").unwrap_or(config.ingestion.max_page_bytes);
        if let Ok(root) = std::env::var("CASTWAVE_UPLOAD_ROOT") {
            config.ingestion.upload_root = Some(PathBuf::from(root));
        }

        if let Ok(dir) = std::env::var("CASTWAVE_AUDIO_DIR") {
            config.shows.audio_dir = Some(dir).filter(|d| !d.is_empty()).map(PathBuf::from);
        }

        config.curation.max_age_hours =
            env_parse("CASTWAVE_CURATION_MAX_AGE_HOURS").unwrap_or(config.curation.max_age_hours);
        config.curation.nudges_per_user =
            env_parse("CASTWAVE_NUDGES_PER_USER").unwrap_or(config.curation.nudges_per_user);

        config.scheduler.retention_days =
            env_parse("CASTWAVE_RETENTION_DAYS").unwrap_or(config.scheduler.retention_days);
        config.scheduler.run_on_startup =
            env_parse("CASTWAVE_RUN_ON_STARTUP").unwrap_or(config.scheduler.run_on_startup);

        if let Ok(path) = std::env::var("CASTWAVE_QUEUE_DB") {
            config.storage.queue_db_path = Some(path).filter(|p| !p.is_empty()).map(PathBuf::from);
        }

        config.logging.level =
            std::env::var("CASTWAVE_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        config.logging.format =
            std::env::var("CASTWAVE_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File when given, environment otherwise; validated either way
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.gateway.validate().context("invalid [gateway] section")?;

        for family in JobFamily::all() {
            let section = self.queue.family(family);
            if section.workers == 0 {
                anyhow::bail!("queue.{family}.workers must be greater than 0");
            }
            if section.max_attempts == 0 {
                anyhow::bail!("queue.{family}.max_attempts must be greater than 0");
            }
            if section.backoff_base_ms > section.backoff_max_ms {
                anyhow::bail!("queue.{family}.backoff_base_ms exceeds backoff_max_ms");
            }
            if let Some(timeout) = section.timeout_secs {
                if timeout == 0 {
                    anyhow::bail!("queue.{family}.timeout_secs must be greater than 0");
                }
                if section.lease_secs <= timeout {
                    anyhow::bail!("queue.{family}.lease_secs must exceed timeout_secs");
                }
            }
        }
        if self.queue.poll_interval_ms == 0 {
            anyhow::bail!("queue.poll_interval_ms must be greater than 0");
        }

        if self.ingestion.page_timeout_secs == 0 {
            anyhow::bail!("ingestion.page_timeout_secs must be greater than 0");
        }
        if self.ingestion.max_input_chars == 0 {
            anyhow::bail!("ingestion.max_input_chars must be greater than 0");
        }
        if self.ingestion.max_page_bytes == 0 {
            anyhow::bail!("ingestion.max_page_bytes must be greater than 0");
        }

        if self.curation.max_age_hours <= 0 || self.curation.trending_window_hours <= 0 {
            anyhow::bail!("curation windows must be positive");
        }
        if self.curation.batch_size == 0 {
            anyhow::bail!("curation.batch_size must be greater than 0");
        }

        self.scheduler
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid [scheduler] section: {e}"))?;

        if self.feed.recency_horizon_hours <= 0.0 {
            anyhow::bail!("feed.recency_horizon_hours must be positive");
        }
        if self.feed.jitter < 0.0 {
            anyhow::bail!("feed.jitter must not be negative");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}
