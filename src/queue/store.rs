//! Job store backends
//!
//! [`SqliteJobStore`] is the durable store; [`MemoryJobStore`] has the same
//! semantics for tests and one-shot runs.

use super::error::{QueueError, QueueResult};
use super::{EnqueueOutcome, Job, JobFamily, JobStatus, NewJob, QueueStats};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Store Trait
// ============================================================================

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job unless one is already queued or running for the entity
    async fn enqueue(&self, job: NewJob) -> QueueResult<EnqueueOutcome>;

    /// Atomically claim the next runnable job of a family.
    ///
    /// Runnable means queued with `run_at <= now`, or running with an expired
    /// lease. Claiming increments `attempts` and sets a fresh lease.
    async fn claim_next(
        &self,
        family: JobFamily,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> QueueResult<Option<Job>>;

    /// Push a running job's lease to `now + lease`. Returns false when
    /// `attempt` no longer holds the job.
    async fn renew_lease(
        &self,
        id: Uuid,
        attempt: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> QueueResult<bool>;

    // The three settle calls below are fenced on the claimed attempt: once a
    // job has been reclaimed, the older attempt gets `LeaseLost` and the row
    // is left alone.

    async fn complete(&self, id: Uuid, attempt: u32) -> QueueResult<()>;

    /// Put a failed job back in the queue for a later attempt
    async fn retry_later(
        &self,
        id: Uuid,
        attempt: u32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> QueueResult<()>;

    /// Terminal failure; the job is never claimed again
    async fn mark_dead(&self, id: Uuid, attempt: u32, error: &str) -> QueueResult<()>;

    async fn get(&self, id: Uuid) -> QueueResult<Option<Job>>;

    async fn stats(&self, family: JobFamily) -> QueueResult<QueueStats>;
}

fn lease_until(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::minutes(15))
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// Fixed-width UTC timestamps so that text comparison orders correctly
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str) -> QueueResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QueueError::Corrupt(format!("bad timestamp '{value}': {e}")))
}

/// Raw row as stored; converted to [`Job`] outside the rusqlite closure
struct JobRow {
    id: String,
    family: String,
    entity_key: String,
    payload: String,
    status: String,
    attempts: u32,
    max_attempts: u32,
    run_at: String,
    lease_expires_at: Option<String>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    const COLUMNS: &'static str = "id, family, entity_key, payload, status, attempts, max_attempts, \
         run_at, lease_expires_at, last_error, created_at, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            family: row.get(1)?,
            entity_key: row.get(2)?,
            payload: row.get(3)?,
            status: row.get(4)?,
            attempts: row.get(5)?,
            max_attempts: row.get(6)?,
            run_at: row.get(7)?,
            lease_expires_at: row.get(8)?,
            last_error: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_job(self) -> QueueResult<Job> {
        Ok(Job {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| QueueError::Corrupt(format!("bad job id '{}': {e}", self.id)))?,
            family: self.family.parse()?,
            entity_key: self.entity_key,
            payload: serde_json::from_str(&self.payload)?,
            status: self.status.parse()?,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            run_at: parse_ts(&self.run_at)?,
            lease_expires_at: self.lease_expires_at.as_deref().map(parse_ts).transpose()?,
            last_error: self.last_error,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// SQLite job store
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection; claims run
/// in an IMMEDIATE transaction so separate processes sharing the file cannot
/// claim the same job.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| QueueError::Corrupt(format!("cannot create {}: {e}", parent.display())))?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA busy_timeout=5000;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite job store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> QueueResult<()> {
        let conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    family TEXT NOT NULL,
                    entity_key TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'queued',
                    attempts INTEGER NOT NULL DEFAULT 0,
                    max_attempts INTEGER NOT NULL,
                    run_at TEXT NOT NULL,
                    lease_expires_at TEXT,
                    last_error TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_claim
                    ON jobs(family, status, run_at);

                CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_entity
                    ON jobs(family, entity_key)
                    WHERE status IN ('queued', 'running');
                "#,
        )?;
        Ok(())
    }

    fn set_status(
        &self,
        id: Uuid,
        attempt: u32,
        status: JobStatus,
        run_at: Option<DateTime<Utc>>,
        error: Option<&str>,
    ) -> QueueResult<()> {
        let conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        let now = ts(Utc::now());
        let changed = conn.execute(
            r#"
                UPDATE jobs SET
                    status = ?2,
                    run_at = COALESCE(?3, run_at),
                    last_error = COALESCE(?4, last_error),
                    lease_expires_at = NULL,
                    updated_at = ?5
                WHERE id = ?1 AND attempts = ?6 AND status = 'running'
                "#,
            params![id.to_string(), status.as_str(), run_at.map(ts), error, now, attempt],
        )?;

        if changed == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM jobs WHERE id = ?1)",
                params![id.to_string()],
                |row| row.get(0),
            )?;
            return Err(if exists {
                QueueError::LeaseLost { job_id: id, attempt }
            } else {
                QueueError::JobNotFound(id)
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, job: NewJob) -> QueueResult<EnqueueOutcome> {
        let mut conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs WHERE family = ?1 AND entity_key = ?2 AND status IN ('queued', 'running')",
                params![job.family.as_str(), job.entity_key],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            let id = Uuid::parse_str(&id)
                .map_err(|e| QueueError::Corrupt(format!("bad job id '{id}': {e}")))?;
            return Ok(EnqueueOutcome::Existing(id));
        }

        let id = Uuid::new_v4();
        let now = ts(Utc::now());
        tx.execute(
            r#"
                INSERT INTO jobs (id, family, entity_key, payload, status, attempts, max_attempts,
                                  run_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'queued', 0, ?5, ?6, ?7, ?7)
                "#,
            params![
                id.to_string(),
                job.family.as_str(),
                job.entity_key,
                serde_json::to_string(&job.payload)?,
                job.max_attempts,
                ts(job.run_at),
                now
            ],
        )?;
        tx.commit()?;

        Ok(EnqueueOutcome::Created(id))
    }

    async fn claim_next(
        &self,
        family: JobFamily,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> QueueResult<Option<Job>> {
        let mut conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now_ts = ts(now);

        let candidate: Option<String> = tx
            .query_row(
                r#"
                    SELECT id FROM jobs
                    WHERE family = ?1
                      AND ((status = 'queued' AND run_at <= ?2)
                        OR (status = 'running' AND lease_expires_at <= ?2))
                    ORDER BY run_at ASC, created_at ASC
                    LIMIT 1
                    "#,
                params![family.as_str(), now_ts],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        tx.execute(
            r#"
                UPDATE jobs SET
                    status = 'running',
                    attempts = attempts + 1,
                    lease_expires_at = ?2,
                    updated_at = ?3
                WHERE id = ?1
                "#,
            params![id, ts(lease_until(now, lease)), now_ts],
        )?;

        let row = tx.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?1", JobRow::COLUMNS),
            params![id],
            JobRow::from_row,
        )?;
        tx.commit()?;

        row.into_job().map(Some)
    }

    async fn renew_lease(
        &self,
        id: Uuid,
        attempt: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> QueueResult<bool> {
        let conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        let changed = conn.execute(
            r#"
                UPDATE jobs SET
                    lease_expires_at = ?3,
                    updated_at = ?4
                WHERE id = ?1 AND attempts = ?2 AND status = 'running'
                "#,
            params![id.to_string(), attempt, ts(lease_until(now, lease)), ts(now)],
        )?;
        Ok(changed > 0)
    }

    async fn complete(&self, id: Uuid, attempt: u32) -> QueueResult<()> {
        self.set_status(id, attempt, JobStatus::Completed, None, None)
    }

    async fn retry_later(
        &self,
        id: Uuid,
        attempt: u32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> QueueResult<()> {
        self.set_status(id, attempt, JobStatus::Queued, Some(run_at), Some(error))
    }

    async fn mark_dead(&self, id: Uuid, attempt: u32, error: &str) -> QueueResult<()> {
        self.set_status(id, attempt, JobStatus::Dead, None, Some(error))
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<Job>> {
        let conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JobRow::COLUMNS),
                params![id.to_string()],
                JobRow::from_row,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    async fn stats(&self, family: JobFamily) -> QueueResult<QueueStats> {
        let conn = self.conn.lock().map_err(|_| QueueError::StorePoisoned)?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM jobs WHERE family = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![family.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match status.parse::<JobStatus>()? {
                JobStatus::Queued => stats.queued = count,
                JobStatus::Running => stats.running = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Dead => stats.dead = count,
            }
        }
        Ok(stats)
    }
}

// ============================================================================
// In-memory Implementation
// ============================================================================

/// In-memory job store with the same claim and dedupe semantics
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: tokio::sync::Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a settle to the job if `attempt` still holds it
    async fn update<F>(&self, id: Uuid, attempt: u32, apply: F) -> QueueResult<()>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        if job.status != JobStatus::Running || job.attempts != attempt {
            return Err(QueueError::LeaseLost { job_id: id, attempt });
        }
        apply(job);
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, new: NewJob) -> QueueResult<EnqueueOutcome> {
        let mut jobs = self.jobs.lock().await;

        if let Some(existing) = jobs.values().find(|job| {
            job.family == new.family && job.entity_key == new.entity_key && job.status.is_active()
        }) {
            return Ok(EnqueueOutcome::Existing(existing.id));
        }

        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            family: new.family,
            entity_key: new.entity_key,
            payload: new.payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts: new.max_attempts,
            run_at: new.run_at,
            lease_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        jobs.insert(id, job);
        Ok(EnqueueOutcome::Created(id))
    }

    async fn claim_next(
        &self,
        family: JobFamily,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> QueueResult<Option<Job>> {
        let mut jobs = self.jobs.lock().await;

        let candidate = jobs
            .values()
            .filter(|job| job.family == family)
            .filter(|job| match job.status {
                JobStatus::Queued => job.run_at <= now,
                JobStatus::Running => job.lease_expires_at.is_some_and(|lease| lease <= now),
                _ => false,
            })
            .min_by_key(|job| (job.run_at, job.created_at))
            .map(|job| job.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        let job = jobs.get_mut(&id).ok_or(QueueError::JobNotFound(id))?;
        job.status = JobStatus::Running;
        job.attempts += 1;
        job.lease_expires_at = Some(lease_until(now, lease));
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn renew_lease(
        &self,
        id: Uuid,
        attempt: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> QueueResult<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Running && job.attempts == attempt => {
                job.lease_expires_at = Some(lease_until(now, lease));
                job.updated_at = now;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(QueueError::JobNotFound(id)),
        }
    }

    async fn complete(&self, id: Uuid, attempt: u32) -> QueueResult<()> {
        self.update(id, attempt, |job| job.status = JobStatus::Completed)
            .await
    }

    async fn retry_later(
        &self,
        id: Uuid,
        attempt: u32,
        run_at: DateTime<Utc>,
        error: &str,
    ) -> QueueResult<()> {
        self.update(id, attempt, |job| {
            job.status = JobStatus::Queued;
            job.run_at = run_at;
            job.last_error = Some(error.to_string());
        })
        .await
    }

    async fn mark_dead(&self, id: Uuid, attempt: u32, error: &str) -> QueueResult<()> {
        self.update(id, attempt, |job| {
            job.status = JobStatus::Dead;
            job.last_error = Some(error.to_string());
        })
        .await
    }

    async fn get(&self, id: Uuid) -> QueueResult<Option<Job>> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn stats(&self, family: JobFamily) -> QueueResult<QueueStats> {
        let jobs = self.jobs.lock().await;
        let mut stats = QueueStats::default();
        for job in jobs.values().filter(|job| job.family == family) {
            match job.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Dead => stats.dead += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn create_test_stores() -> Vec<(&'static str, Arc<dyn JobStore>)> {
        vec![
            ("memory", Arc::new(MemoryJobStore::new())),
            ("sqlite", Arc::new(SqliteJobStore::in_memory().unwrap())),
        ]
    }

    fn new_job(key: &str) -> NewJob {
        NewJob {
            family: JobFamily::ContentProcessing,
            entity_key: key.to_string(),
            payload: serde_json::json!({ "key": key }),
            max_attempts: 3,
            run_at: Utc::now() - chrono::Duration::seconds(1),
        }
    }

    const LEASE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_enqueue_dedupe_and_requeue_after_completion() {
        for (name, store) in create_test_stores() {
            let first = store.enqueue(new_job("a")).await.unwrap();
            let second = store.enqueue(new_job("a")).await.unwrap();
            assert!(matches!(first, EnqueueOutcome::Created(_)), "{name}");
            assert_eq!(second, EnqueueOutcome::Existing(first.id()), "{name}");

            let job = store
                .claim_next(JobFamily::ContentProcessing, Utc::now(), LEASE)
                .await
                .unwrap()
                .unwrap();
            store.complete(job.id, job.attempts).await.unwrap();

            // Once finished, the entity may be enqueued again
            let third = store.enqueue(new_job("a")).await.unwrap();
            assert!(matches!(third, EnqueueOutcome::Created(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_claim_increments_attempts_and_hides_job() {
        for (name, store) in create_test_stores() {
            store.enqueue(new_job("a")).await.unwrap();
            let now = Utc::now();

            let job = store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(job.attempts, 1, "{name}");
            assert_eq!(job.status, JobStatus::Running, "{name}");
            assert_eq!(job.payload["key"], "a", "{name}");

            let again = store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap();
            assert!(again.is_none(), "{name}: leased job must not be claimed twice");
        }
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        for (name, store) in create_test_stores() {
            store.enqueue(new_job("a")).await.unwrap();
            let now = Utc::now();
            store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap()
                .unwrap();

            let later = now + chrono::Duration::seconds(120);
            let reclaimed = store
                .claim_next(JobFamily::ContentProcessing, later, LEASE)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reclaimed.attempts, 2, "{name}");
        }
    }

    #[tokio::test]
    async fn test_renewed_lease_is_not_reclaimed() {
        for (name, store) in create_test_stores() {
            store.enqueue(new_job("a")).await.unwrap();
            let now = Utc::now();
            let job = store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap()
                .unwrap();

            let renewed_at = now + chrono::Duration::seconds(50);
            assert!(store
                .renew_lease(job.id, job.attempts, renewed_at, LEASE)
                .await
                .unwrap(), "{name}");

            // The original lease would have expired at +60s
            let during = now + chrono::Duration::seconds(90);
            assert!(store
                .claim_next(JobFamily::ContentProcessing, during, LEASE)
                .await
                .unwrap()
                .is_none(), "{name}");

            let after = now + chrono::Duration::seconds(120);
            let reclaimed = store
                .claim_next(JobFamily::ContentProcessing, after, LEASE)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reclaimed.attempts, 2, "{name}");
        }
    }

    #[tokio::test]
    async fn test_reclaimed_attempt_cannot_settle() {
        for (name, store) in create_test_stores() {
            store.enqueue(new_job("a")).await.unwrap();
            let now = Utc::now();
            let first = store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap()
                .unwrap();
            let later = now + chrono::Duration::seconds(120);
            let second = store
                .claim_next(JobFamily::ContentProcessing, later, LEASE)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(second.attempts, 2, "{name}");

            assert!(!store
                .renew_lease(first.id, first.attempts, later, LEASE)
                .await
                .unwrap(), "{name}");
            for err in [
                store.complete(first.id, first.attempts).await.unwrap_err(),
                store.retry_later(first.id, first.attempts, later, "late").await.unwrap_err(),
                store.mark_dead(first.id, first.attempts, "late").await.unwrap_err(),
            ] {
                assert!(
                    matches!(err, QueueError::LeaseLost { attempt: 1, .. }),
                    "{name}: {err}"
                );
            }

            let job = store.get(first.id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Running, "{name}");
            assert_eq!(job.attempts, 2, "{name}");
            assert_eq!(job.last_error, None, "{name}");

            store.complete(second.id, second.attempts).await.unwrap();
            let job = store.get(first.id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed, "{name}");
        }
    }

    #[tokio::test]
    async fn test_retry_later_respects_run_at() {
        for (name, store) in create_test_stores() {
            store.enqueue(new_job("a")).await.unwrap();
            let now = Utc::now();
            let job = store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap()
                .unwrap();

            let run_at = now + chrono::Duration::seconds(30);
            store.retry_later(job.id, job.attempts, run_at, "boom").await.unwrap();

            assert!(store
                .claim_next(JobFamily::ContentProcessing, now, LEASE)
                .await
                .unwrap()
                .is_none(), "{name}");

            let job = store
                .claim_next(JobFamily::ContentProcessing, run_at, LEASE)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(job.last_error.as_deref(), Some("boom"), "{name}");
        }
    }

    #[tokio::test]
    async fn test_dead_jobs_and_stats() {
        for (name, store) in create_test_stores() {
            store.enqueue(new_job("a")).await.unwrap();
            store.enqueue(new_job("b")).await.unwrap();
            let job = store
                .claim_next(JobFamily::ContentProcessing, Utc::now(), LEASE)
                .await
                .unwrap()
                .unwrap();
            store.mark_dead(job.id, job.attempts, "fatal").await.unwrap();

            let stats = store.stats(JobFamily::ContentProcessing).await.unwrap();
            assert_eq!(stats.dead, 1, "{name}");
            assert_eq!(stats.queued, 1, "{name}");
            assert_eq!(stats.active(), 1, "{name}");

            let dead = store.get(job.id).await.unwrap().unwrap();
            assert_eq!(dead.status, JobStatus::Dead, "{name}");
            assert!(store
                .stats(JobFamily::ShowGeneration)
                .await
                .unwrap()
                .active() == 0, "{name}");
        }
    }

    #[tokio::test]
    async fn test_unknown_job_errors() {
        for (name, store) in create_test_stores() {
            let err = store.complete(Uuid::new_v4(), 1).await.unwrap_err();
            assert!(matches!(err, QueueError::JobNotFound(_)), "{name}");
        }
    }

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let id = {
            let store = SqliteJobStore::open(&path).unwrap();
            store.enqueue(new_job("durable")).await.unwrap().id()
        };

        let store = SqliteJobStore::open(&path).unwrap();
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.entity_key, "durable");
        assert_eq!(job.status, JobStatus::Queued);
    }
}
