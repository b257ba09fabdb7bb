//! Error types for the job queue

use crate::error::{CastwaveErrorTrait, ErrorCategory};
use thiserror::Error;
use uuid::Uuid;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Error, Debug)]
pub enum QueueError {
    /// SQLite backing store error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload or row could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value could not be interpreted
    #[error("corrupt job row: {0}")]
    Corrupt(String),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    /// A thread panicked while holding the store lock
    #[error("job store lock poisoned")]
    StorePoisoned,

    /// Handler exceeded the family's hard timeout
    #[error("job {job_id} timed out after {timeout_secs}s")]
    Timeout { job_id: Uuid, timeout_secs: u64 },

    /// The job was reclaimed after this attempt's lease ran out
    #[error("job {job_id} attempt {attempt} no longer holds its lease")]
    LeaseLost { job_id: Uuid, attempt: u32 },

    /// Terminal processing error: the retry budget is spent
    #[error("job {job_id} exhausted {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        job_id: Uuid,
        attempts: u32,
        last_error: String,
    },
}

impl CastwaveErrorTrait for QueueError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Timeout { .. })
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Queue
    }
}
