//! Worker pools that drain one job family each
//!
//! # Attempt lifecycle
//!
//! ```text
//!  claim ──▶ handle ──┬─ Ok ─────────────────────────────▶ completed
//!                     ├─ Err, not recoverable ───────────▶ dead + on_exhausted
//!                     ├─ Err, attempts == max_attempts ──▶ dead + on_exhausted
//!                     └─ Err ──▶ queued (run_at = now + backoff)
//! ```
//!
//! While the handler runs, the worker renews the lease every third of the
//! lease period, so a slow but live attempt is never reclaimed. Settling is
//! fenced on the attempt number: if the job was reclaimed anyway (a stalled
//! process), the late result is dropped as [`JobOutcome::Superseded`].

use super::error::{QueueError, QueueResult};
use super::{Job, JobFamily, JobPolicy, JobQueue};
use crate::error::{CastwaveErrorTrait, Error};
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Executes jobs of one family
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> crate::Result<()>;

    /// Called once when the job is dead-lettered; marks the owning entity FAILED
    async fn on_exhausted(&self, job: &Job, error: &Error);
}

/// What happened to one claimed job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Retrying { attempt: u32, delay: Duration },
    Dead { error: String },
    /// The job was reclaimed by a newer attempt; this result was discarded
    Superseded,
}

// ============================================================================
// Worker Statistics
// ============================================================================

/// Worker statistics (thread-safe)
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub completed: AtomicU64,
    pub retried: AtomicU64,
    pub dead: AtomicU64,
}

impl WorkerStats {
    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed => &self.completed,
            JobOutcome::Retrying { .. } => &self.retried,
            JobOutcome::Dead { .. } => &self.dead,
            JobOutcome::Superseded => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead: self.dead.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub completed: u64,
    pub retried: u64,
    pub dead: u64,
}

// ============================================================================
// Worker Pool
// ============================================================================

pub struct WorkerPool {
    family: JobFamily,
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    workers: usize,
    poll_interval: Duration,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    pub fn new(family: JobFamily, queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            family,
            queue,
            handler,
            workers: 1,
            poll_interval: Duration::from_millis(500),
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn family(&self) -> JobFamily {
        self.family
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Claim and run a single job, if one is runnable
    pub async fn process_next(&self) -> QueueResult<Option<JobOutcome>> {
        let policy = self.queue.policy(self.family);

        let Some(job) = self
            .queue
            .store()
            .claim_next(self.family, Utc::now(), policy.lease)
            .await?
        else {
            return Ok(None);
        };

        let outcome = match self.run_claimed(&job, &policy).await {
            Ok(outcome) => outcome,
            Err(QueueError::LeaseLost { attempt, .. }) => {
                warn!(
                    job_id = %job.id,
                    family = %self.family,
                    entity = %job.entity_key,
                    attempt,
                    "Job was reclaimed; dropping stale result"
                );
                JobOutcome::Superseded
            }
            Err(e) => return Err(e),
        };

        let label = match &outcome {
            JobOutcome::Completed => "completed",
            JobOutcome::Retrying { .. } => "retried",
            JobOutcome::Dead { .. } => "dead",
            JobOutcome::Superseded => "superseded",
        };
        metrics::record_job(self.family.as_str(), label);
        self.stats.record(&outcome);

        Ok(Some(outcome))
    }

    async fn run_claimed(&self, job: &Job, policy: &JobPolicy) -> QueueResult<JobOutcome> {
        let store = self.queue.store();

        // Reclaimed after a crash during the final attempt
        if job.attempts > job.max_attempts {
            let err = Error::Queue(QueueError::AttemptsExhausted {
                job_id: job.id,
                attempts: job.max_attempts,
                last_error: job
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "lease expired".to_string()),
            });
            return self.exhaust(job, &err).await;
        }

        debug!(
            job_id = %job.id,
            family = %self.family,
            entity = %job.entity_key,
            attempt = job.attempts,
            "Running job"
        );

        let started = Instant::now();
        let result = self.run_leased(job, policy).await;
        metrics::observe_job_duration(self.family.as_str(), started.elapsed());

        let outcome = match result {
            Ok(()) => {
                store.complete(job.id, job.attempts).await?;
                info!(
                    job_id = %job.id,
                    family = %self.family,
                    entity = %job.entity_key,
                    attempt = job.attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                JobOutcome::Completed
            }
            Err(err) if !err.is_recoverable() => {
                warn!(
                    job_id = %job.id,
                    family = %self.family,
                    error = %err,
                    "Non-retryable job failure"
                );
                self.exhaust(job, &err).await?
            }
            Err(err) if job.is_final_attempt() => {
                let terminal = Error::Queue(QueueError::AttemptsExhausted {
                    job_id: job.id,
                    attempts: job.attempts,
                    last_error: err.to_string(),
                });
                self.exhaust(job, &terminal).await?
            }
            Err(err) => {
                let delay = policy.backoff_after(job.attempts);
                let run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                store
                    .retry_later(job.id, job.attempts, run_at, &err.to_string())
                    .await?;
                warn!(
                    job_id = %job.id,
                    family = %self.family,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Job failed, will retry"
                );
                JobOutcome::Retrying {
                    attempt: job.attempts,
                    delay,
                }
            }
        };
        Ok(outcome)
    }

    /// Run the handler while a heartbeat keeps the lease alive
    async fn run_leased(&self, job: &Job, policy: &JobPolicy) -> crate::Result<()> {
        let work = self.run_handler(job, policy);
        tokio::pin!(work);
        let heartbeat = self.keep_lease(job, policy.lease);
        tokio::pin!(heartbeat);

        tokio::select! {
            result = &mut work => result,
            // Lease lost; let the attempt finish, its settle will be fenced off
            () = &mut heartbeat => work.await,
        }
    }

    /// Renew the lease until it is lost; never returns while it is held
    async fn keep_lease(&self, job: &Job, lease: Duration) {
        let every = (lease / 3).max(Duration::from_millis(10));
        loop {
            tokio::time::sleep(every).await;
            match self
                .queue
                .store()
                .renew_lease(job.id, job.attempts, Utc::now(), lease)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    warn!(job_id = %job.id, attempt = job.attempts, "Lease lost while running");
                    return;
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Lease renewal failed");
                }
            }
        }
    }

    async fn run_handler(&self, job: &Job, policy: &JobPolicy) -> crate::Result<()> {
        match policy.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.handler.handle(job)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Queue(QueueError::Timeout {
                    job_id: job.id,
                    timeout_secs: timeout.as_secs(),
                })),
            },
            None => self.handler.handle(job).await,
        }
    }

    async fn exhaust(&self, job: &Job, err: &Error) -> QueueResult<JobOutcome> {
        self.queue
            .store()
            .mark_dead(job.id, job.attempts, &err.to_string())
            .await?;
        error!(
            job_id = %job.id,
            family = %self.family,
            entity = %job.entity_key,
            attempts = job.attempts,
            error = %err,
            "Job dead-lettered"
        );
        self.handler.on_exhausted(job, err).await;
        Ok(JobOutcome::Dead {
            error: err.to_string(),
        })
    }

    /// Process jobs until the family has nothing queued or running.
    ///
    /// Jobs waiting out a backoff are waited for.
    pub async fn run_until_idle(&self) -> QueueResult<WorkerStatsSnapshot> {
        loop {
            if self.process_next().await?.is_some() {
                continue;
            }
            if self.queue.stats(self.family).await?.active() == 0 {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(self.stats.snapshot())
    }

    /// Spawn the configured number of workers; each stops when `shutdown` flips to true
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            family = %self.family,
            workers = self.workers,
            "Starting worker pool"
        );

        (0..self.workers)
            .map(|worker_id| {
                let pool = Arc::clone(self);
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        if *shutdown.borrow() {
                            break;
                        }
                        match pool.process_next().await {
                            Ok(Some(_)) => continue,
                            Ok(None) => {}
                            Err(e) => {
                                error!(worker_id, family = %pool.family, error = %e, "Worker error");
                            }
                        }
                        tokio::select! {
                            _ = tokio::time::sleep(pool.poll_interval) => {}
                            changed = shutdown.changed() => {
                                // Sender gone: nobody can signal shutdown any more
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    debug!(worker_id, family = %pool.family, "Worker stopped");
                })
            })
            .collect()
    }
}
