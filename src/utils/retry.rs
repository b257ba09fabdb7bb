//! Exponential backoff
//!
//! One schedule type serves two callers: the page fetcher retries a transient
//! fetch failure in place, and the job queue uses [`Backoff::delay_before`] to
//! push a failed job's next `run_at` into the future.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Doubling delay schedule with a ceiling
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// In-place retries after the first failure (unused by the job queue,
    /// whose attempt budget lives in the job)
    pub retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(retries: u32, base_ms: u64, cap_ms: u64) -> Self {
        Self {
            retries,
            base: Duration::from_millis(base_ms),
            cap: Duration::from_millis(cap_ms),
        }
    }

    /// Delay before retry `n` (1-based): `base * 2^(n-1)`, never above `cap`.
    /// Retry 0 is the first try and waits nothing.
    pub fn delay_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the retries run out. The last error is returned.
///
/// ```no_run
/// use castwave::utils::retry::{retry_transient, Backoff};
///
/// # async fn fetch() -> Result<String, std::io::Error> { Ok(String::new()) }
/// # async fn run() -> Result<(), std::io::Error> {
/// let body = retry_transient(&Backoff::new(2, 500, 5_000), fetch, |e: &std::io::Error| {
///     e.kind() == std::io::ErrorKind::TimedOut
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_transient<T, E, F, Fut, P>(
    backoff: &Backoff,
    operation: F,
    is_transient: P,
) -> Result<T, E>
where
    E: Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;
    loop {
        if retry > 0 {
            let delay = backoff.delay_before(retry);
            debug!(retry, delay_ms = delay.as_millis() as u64, "Backing off");
            tokio::time::sleep(delay).await;
        }

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_transient(&err) || retry >= backoff.retries {
            return Err(err);
        }
        warn!(retry, retries = backoff.retries, error = %err, "Transient failure, retrying");
        retry += 1;
    }
}
