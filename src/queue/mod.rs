//! Durable, retrying job queue
//!
//! One logical queue per [`JobFamily`]. Each family has a [`JobPolicy`]
//! (attempt budget, exponential backoff, optional hard timeout). Delivery is
//! at-least-once: a claimed job carries a lease, and a job whose lease expires
//! without completion becomes claimable again. Handlers must therefore be
//! idempotent with respect to final entity state.
//!
//! At most one queued or running job exists per `(family, entity_key)`;
//! enqueueing a duplicate returns the id of the job already in flight.

pub mod error;
pub mod store;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use store::{JobStore, MemoryJobStore, SqliteJobStore};
pub use worker::{JobHandler, JobOutcome, WorkerPool, WorkerStats, WorkerStatsSnapshot};

use crate::utils::retry::Backoff;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// Core Types
// ============================================================================

/// Task families, each served by its own worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFamily {
    ContentProcessing,
    ShowGeneration,
}

impl JobFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentProcessing => "content_processing",
            Self::ShowGeneration => "show_generation",
        }
    }

    pub fn all() -> [JobFamily; 2] {
        [Self::ContentProcessing, Self::ShowGeneration]
    }
}

impl std::fmt::Display for JobFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobFamily {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_processing" => Ok(Self::ContentProcessing),
            "show_generation" => Ok(Self::ShowGeneration),
            other => Err(QueueError::Corrupt(format!("unknown job family '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(QueueError::Corrupt(format!("unknown job status '{other}'"))),
        }
    }
}

/// A unit of background work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub family: JobFamily,
    /// Identity of the entity the job mutates (content id, show id)
    pub entity_key: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, including the current one
    pub attempts: u32,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn payload_as<T: DeserializeOwned>(&self) -> QueueResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Insert request for a job store
#[derive(Debug, Clone)]
pub struct NewJob {
    pub family: JobFamily,
    pub entity_key: String,
    pub payload: serde_json::Value,
    pub max_attempts: u32,
    pub run_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Created(Uuid),
    /// A queued or running job already exists for the entity
    Existing(Uuid),
}

impl EnqueueOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Created(id) | Self::Existing(id) => *id,
        }
    }
}

/// Job counts for one family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub dead: usize,
}

impl QueueStats {
    /// Jobs that have not reached a terminal state
    pub fn active(&self) -> usize {
        self.queued + self.running
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Retry and timeout rules for one family
#[derive(Debug, Clone, PartialEq)]
pub struct JobPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Hard ceiling on a single attempt
    pub timeout: Option<Duration>,
    /// How long a claimed job stays invisible to other workers
    pub lease: Duration,
}

impl JobPolicy {
    /// Three attempts, backoff from 2s, no hard timeout
    pub fn content_processing() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::new(2, 2_000, 60_000),
            timeout: None,
            lease: Duration::from_secs(15 * 60),
        }
    }

    /// Two attempts, backoff from 5s, 10-minute timeout
    pub fn show_generation() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::new(1, 5_000, 120_000),
            timeout: Some(Duration::from_secs(10 * 60)),
            lease: Duration::from_secs(11 * 60),
        }
    }

    pub fn for_family(family: JobFamily) -> Self {
        match family {
            JobFamily::ContentProcessing => Self::content_processing(),
            JobFamily::ShowGeneration => Self::show_generation(),
        }
    }

    /// Delay before the next attempt after `failed_attempts` failures.
    ///
    /// Attempt `n` (n >= 2) waits `base * 2^(n-2)`, capped.
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        self.backoff.delay_before(failed_attempts.max(1))
    }
}

// ============================================================================
// Queue facade
// ============================================================================

/// Enqueue side of the job queue, shared by submitters and worker pools
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    policies: HashMap<JobFamily, JobPolicy>,
}

impl JobQueue {
    /// Queue with the built-in policy for every family
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        let policies = JobFamily::all()
            .into_iter()
            .map(|family| (family, JobPolicy::for_family(family)))
            .collect();
        Self { store, policies }
    }

    pub fn with_policy(mut self, family: JobFamily, policy: JobPolicy) -> Self {
        self.policies.insert(family, policy);
        self
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryJobStore::new()))
    }

    pub fn policy(&self, family: JobFamily) -> JobPolicy {
        self.policies
            .get(&family)
            .cloned()
            .unwrap_or_else(|| JobPolicy::for_family(family))
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Enqueue a job for an entity, returning the id of the job that will run it
    pub async fn enqueue<P: Serialize>(
        &self,
        family: JobFamily,
        entity_key: impl Into<String>,
        payload: &P,
    ) -> QueueResult<Uuid> {
        let entity_key = entity_key.into();
        let policy = self.policy(family);
        let outcome = self
            .store
            .enqueue(NewJob {
                family,
                entity_key: entity_key.clone(),
                payload: serde_json::to_value(payload)?,
                max_attempts: policy.max_attempts,
                run_at: Utc::now(),
            })
            .await?;

        match outcome {
            EnqueueOutcome::Created(id) => {
                info!(job_id = %id, family = %family, entity = %entity_key, "Job enqueued");
            }
            EnqueueOutcome::Existing(id) => {
                debug!(job_id = %id, family = %family, entity = %entity_key, "Job already in flight");
            }
        }

        Ok(outcome.id())
    }

    pub async fn get(&self, id: Uuid) -> QueueResult<Option<Job>> {
        self.store.get(id).await
    }

    pub async fn stats(&self, family: JobFamily) -> QueueResult<QueueStats> {
        self.store.stats(family).await
    }
}
