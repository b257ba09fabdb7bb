//! Interval scheduler for curation and maintenance triggers
//!
//! # Overview
//!
//! Every registered trigger runs on its own fixed interval. Before running,
//! a firing takes the trigger's named advisory lock; when a previous run
//! still holds it, the firing is skipped. Failures are logged and reported
//! as events, and never stop other triggers.
//!
//! ```text
//!  tick ──▶ try_acquire("trigger:<name>") ──┬─ held ──▶ Skipped
//!                                           └─ ok ────▶ Started ──▶ action ──┬─▶ Completed
//!                                                                            └─▶ Failed
//! ```
//!
//! # Built-in triggers
//!
//! | Trigger | Default interval | Action |
//! |---------|------------------|--------|
//! | `content_refresh` | 24h | full curation pass |
//! | `trending_recompute` | 1h | trending topic snapshot |
//! | `recommendation_refresh` | 6h | relevance rescoring |
//! | `cleanup` | 7d | retention sweep |

pub mod error;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use trigger::{
    CurationAction, CurationTask, TriggerAction, TriggerConfig, TriggerConfigBuilder, TriggerEvent,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::curation::CurationEngine;
use crate::metrics;
use crate::utils::lock::LockRegistry;

/// Result of firing one trigger
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerRunOutcome {
    Completed { summary: String },
    Failed { error: String },
    Skipped,
}

struct RegisteredTrigger {
    name: String,
    interval: Duration,
    action: Arc<dyn TriggerAction>,
}

pub struct Scheduler {
    triggers: Vec<RegisteredTrigger>,
    locks: LockRegistry,
    event_sender: broadcast::Sender<TriggerEvent>,
    run_on_startup: bool,
    started: AtomicBool,
}

impl Scheduler {
    pub fn new(run_on_startup: bool) -> Self {
        let (event_sender, _) = broadcast::channel(100);
        Self {
            triggers: Vec::new(),
            locks: LockRegistry::new(),
            event_sender,
            run_on_startup,
            started: AtomicBool::new(false),
        }
    }

    /// Scheduler with the four built-in curation triggers
    pub fn for_curation(engine: Arc<CurationEngine>, config: &TriggerConfig) -> SchedulerResult<Self> {
        config.validate()?;
        let mut scheduler = Self::new(config.run_on_startup);
        for (name, interval) in config.intervals() {
            let task = match name {
                trigger::CONTENT_REFRESH => CurationTask::Refresh,
                trigger::TRENDING_RECOMPUTE => CurationTask::Trending,
                trigger::RECOMMENDATION_REFRESH => CurationTask::Recommendations,
                _ => CurationTask::Cleanup {
                    retention: config.retention(),
                },
            };
            scheduler.register(
                name,
                interval,
                Arc::new(CurationAction::new(Arc::clone(&engine), task)),
            )?;
        }
        Ok(scheduler)
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        interval: Duration,
        action: Arc<dyn TriggerAction>,
    ) -> SchedulerResult<()> {
        let name = name.into();
        if interval.is_zero() {
            return Err(SchedulerError::trigger_config(
                name,
                "Interval must be greater than 0",
            ));
        }
        if self.triggers.iter().any(|t| t.name == name) {
            return Err(SchedulerError::DuplicateTrigger { name });
        }
        self.triggers.push(RegisteredTrigger {
            name,
            interval,
            action,
        });
        Ok(())
    }

    pub fn trigger_names(&self) -> Vec<&str> {
        self.triggers.iter().map(|t| t.name.as_str()).collect()
    }

    /// Subscribe to trigger events
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.event_sender.subscribe()
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    fn lock_name(trigger: &str) -> String {
        format!("trigger:{trigger}")
    }

    fn emit(&self, event: TriggerEvent) {
        // No subscribers is fine
        let _ = self.event_sender.send(event);
    }

    /// Run one trigger now. Action failures are reported in the outcome,
    /// not as an error.
    pub async fn fire(&self, name: &str) -> SchedulerResult<TriggerRunOutcome> {
        let trigger = self
            .triggers
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| {
                SchedulerError::unknown_trigger(
                    name,
                    self.triggers.iter().map(|t| t.name.clone()).collect(),
                )
            })?;

        let Some(_guard) = self.locks.try_acquire(&Self::lock_name(name)) else {
            warn!(trigger = %name, "Previous run still active, skipping");
            metrics::record_trigger_run(name, "skipped");
            self.emit(TriggerEvent::Skipped {
                trigger: name.to_string(),
                at: Utc::now(),
            });
            return Ok(TriggerRunOutcome::Skipped);
        };

        info!(trigger = %name, "Trigger fired");
        self.emit(TriggerEvent::Started {
            trigger: name.to_string(),
            at: Utc::now(),
        });
        let started = Instant::now();

        match trigger.action.run().await {
            Ok(summary) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(trigger = %name, elapsed_ms, summary = %summary, "Trigger completed");
                metrics::record_trigger_run(name, "completed");
                self.emit(TriggerEvent::Completed {
                    trigger: name.to_string(),
                    summary: summary.clone(),
                    elapsed_ms,
                });
                Ok(TriggerRunOutcome::Completed { summary })
            }
            Err(e) => {
                error!(trigger = %name, error = %e, "Trigger failed");
                metrics::record_trigger_run(name, "failed");
                self.emit(TriggerEvent::Failed {
                    trigger: name.to_string(),
                    error: e.to_string(),
                });
                Ok(TriggerRunOutcome::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Spawn one interval loop per trigger; each stops when `shutdown` flips
    /// to true. Runs are spawned off the loop so a slow run overlaps the next
    /// tick and that firing is skipped.
    pub fn start(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> SchedulerResult<Vec<JoinHandle<()>>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        info!(
            triggers = self.triggers.len(),
            run_on_startup = self.run_on_startup,
            "Starting scheduler"
        );

        let handles = self
            .triggers
            .iter()
            .map(|trigger| {
                let scheduler = Arc::clone(self);
                let name = trigger.name.clone();
                let period = trigger.interval;
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let first = if scheduler.run_on_startup {
                        tokio::time::Instant::now()
                    } else {
                        tokio::time::Instant::now() + period
                    };
                    let mut ticker = tokio::time::interval_at(first, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        if *shutdown.borrow() {
                            break;
                        }
                        tokio::select! {
                            _ = ticker.tick() => {
                                let scheduler = Arc::clone(&scheduler);
                                let name = name.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = scheduler.fire(&name).await {
                                        error!(trigger = %name, error = %e, "Trigger dispatch failed");
                                    }
                                });
                            }
                            changed = shutdown.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    debug!(trigger = %name, "Trigger loop stopped");
                })
            })
            .collect();

        Ok(handles)
    }
}
