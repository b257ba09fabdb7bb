//! Named advisory locks
//!
//! A [`LockRegistry`] hands out at most one guard per name at a time. Holders
//! keep the guard for the duration of the work; dropping it releases the name.
//! Acquisition never blocks: a busy name yields `None`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct LockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Proof of holding a named lock; released on drop
#[derive(Debug)]
pub struct LockGuard {
    name: String,
    acquired_at: DateTime<Utc>,
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Try to acquire the named lock without blocking.
    ///
    /// Returns `None` if another holder has it.
    pub fn try_acquire(&self, name: &str) -> Option<LockGuard> {
        let guard = self.slot(name).try_lock_owned().ok()?;
        Some(LockGuard {
            name: name.to_string(),
            acquired_at: Utc::now(),
            _guard: guard,
        })
    }

    /// Is the named lock currently held?
    pub fn is_held(&self, name: &str) -> bool {
        self.slot(name).try_lock().is_err()
    }
}
