//! Trigger configuration, events and actions
//!
//! A trigger is a named action fired on a fixed interval. The built-in
//! triggers each run one curation engine operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::error::{SchedulerError, SchedulerResult};
use crate::curation::{CurationEngine, CurationScope};

pub const CONTENT_REFRESH: &str = "content_refresh";
pub const TRENDING_RECOMPUTE: &str = "trending_recompute";
pub const RECOMMENDATION_REFRESH: &str = "recommendation_refresh";
pub const CLEANUP: &str = "cleanup";

// ============================================================================
// Trigger Configuration
// ============================================================================

/// Intervals for the built-in triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Full curation pass (daily)
    pub content_refresh_secs: u64,

    /// Trending topic recount (hourly)
    pub trending_secs: u64,

    /// Relevance rescoring (every 6 hours)
    pub recommendations_secs: u64,

    /// Retention sweep (weekly)
    pub cleanup_secs: u64,

    /// Age after which failed and unplayed records are removed
    pub retention_days: i64,

    /// Fire every trigger once when the scheduler starts
    pub run_on_startup: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            content_refresh_secs: 24 * 60 * 60,
            trending_secs: 60 * 60,
            recommendations_secs: 6 * 60 * 60,
            cleanup_secs: 7 * 24 * 60 * 60,
            retention_days: 30,
            run_on_startup: false,
        }
    }
}

impl TriggerConfig {
    /// Create a new config builder
    pub fn builder() -> TriggerConfigBuilder {
        TriggerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        for (field, secs) in [
            ("content_refresh_secs", self.content_refresh_secs),
            ("trending_secs", self.trending_secs),
            ("recommendations_secs", self.recommendations_secs),
            ("cleanup_secs", self.cleanup_secs),
        ] {
            if secs == 0 {
                return Err(SchedulerError::trigger_config(
                    field,
                    "Interval must be greater than 0",
                ));
            }
        }

        if self.retention_days <= 0 {
            return Err(SchedulerError::trigger_config(
                "retention_days",
                format!("Retention must be positive, got {}", self.retention_days),
            ));
        }

        Ok(())
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    /// `(name, interval)` of every built-in trigger
    pub fn intervals(&self) -> [(&'static str, Duration); 4] {
        [
            (CONTENT_REFRESH, Duration::from_secs(self.content_refresh_secs)),
            (TRENDING_RECOMPUTE, Duration::from_secs(self.trending_secs)),
            (RECOMMENDATION_REFRESH, Duration::from_secs(self.recommendations_secs)),
            (CLEANUP, Duration::from_secs(self.cleanup_secs)),
        ]
    }
}

/// Builder for TriggerConfig
#[derive(Debug, Default)]
pub struct TriggerConfigBuilder {
    content_refresh_secs: Option<u64>,
    trending_secs: Option<u64>,
    recommendations_secs: Option<u64>,
    cleanup_secs: Option<u64>,
    retention_days: Option<i64>,
    run_on_startup: Option<bool>,
}

impl TriggerConfigBuilder {
    pub fn content_refresh_secs(mut self, secs: u64) -> Self {
        self.content_refresh_secs = Some(secs);
        self
    }

    pub fn trending_secs(mut self, secs: u64) -> Self {
        self.trending_secs = Some(secs);
        self
    }

    pub fn recommendations_secs(mut self, secs: u64) -> Self {
        self.recommendations_secs = Some(secs);
        self
    }

    pub fn cleanup_secs(mut self, secs: u64) -> Self {
        self.cleanup_secs = Some(secs);
        self
    }

    pub fn retention_days(mut self, days: i64) -> Self {
        self.retention_days = Some(days);
        self
    }

    /// Set run on startup
    pub fn run_on_startup(mut self, value: bool) -> Self {
        self.run_on_startup = Some(value);
        self
    }

    /// Build the config
    pub fn build(self) -> SchedulerResult<TriggerConfig> {
        let defaults = TriggerConfig::default();
        let config = TriggerConfig {
            content_refresh_secs: self.content_refresh_secs.unwrap_or(defaults.content_refresh_secs),
            trending_secs: self.trending_secs.unwrap_or(defaults.trending_secs),
            recommendations_secs: self
                .recommendations_secs
                .unwrap_or(defaults.recommendations_secs),
            cleanup_secs: self.cleanup_secs.unwrap_or(defaults.cleanup_secs),
            retention_days: self.retention_days.unwrap_or(defaults.retention_days),
            run_on_startup: self.run_on_startup.unwrap_or(defaults.run_on_startup),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Trigger Events
// ============================================================================

/// Events emitted for every firing
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    Started {
        trigger: String,
        at: DateTime<Utc>,
    },

    Completed {
        trigger: String,
        summary: String,
        elapsed_ms: u64,
    },

    Failed {
        trigger: String,
        error: String,
    },

    /// A prior run still holds the trigger's lock
    Skipped {
        trigger: String,
        at: DateTime<Utc>,
    },
}

impl TriggerEvent {
    pub fn trigger(&self) -> &str {
        match self {
            Self::Started { trigger, .. }
            | Self::Completed { trigger, .. }
            | Self::Failed { trigger, .. }
            | Self::Skipped { trigger, .. } => trigger,
        }
    }
}

// ============================================================================
// Trigger Actions
// ============================================================================

/// Work performed when a trigger fires
#[async_trait]
pub trait TriggerAction: Send + Sync {
    /// Run once, returning a one-line summary
    async fn run(&self) -> crate::Result<String>;
}

/// Curation engine operation run by a built-in trigger
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurationTask {
    Refresh,
    Trending,
    Recommendations,
    Cleanup { retention: chrono::Duration },
}

pub struct CurationAction {
    engine: Arc<CurationEngine>,
    task: CurationTask,
}

impl CurationAction {
    pub fn new(engine: Arc<CurationEngine>, task: CurationTask) -> Self {
        Self { engine, task }
    }
}

#[async_trait]
impl TriggerAction for CurationAction {
    async fn run(&self) -> crate::Result<String> {
        match self.task {
            CurationTask::Refresh => {
                let report = self.engine.refresh(CurationScope::Global).await?;
                Ok(format!(
                    "recurated {}, shows {}, nudges {}, failures {}",
                    report.recurated,
                    report.shows_requested,
                    report.nudges_created,
                    report.failures()
                ))
            }
            CurationTask::Trending => {
                let snapshot = self.engine.recompute_trending().await?;
                Ok(format!("{} trending topics", snapshot.topics.len()))
            }
            CurationTask::Recommendations => {
                let updated = self.engine.refresh_recommendations().await?;
                Ok(format!("{updated} scores updated"))
            }
            CurationTask::Cleanup { retention } => {
                let report = self.engine.cleanup(retention).await?;
                Ok(format!("{} records removed", report.total()))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
