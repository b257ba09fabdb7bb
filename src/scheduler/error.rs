//! Error types for the scheduler module

use std::fmt;

use crate::error::{CastwaveErrorTrait, ErrorCategory};

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// No trigger registered under the name
    UnknownTrigger {
        name: String,
        valid_options: Vec<String>,
    },

    /// Two triggers registered under one name
    DuplicateTrigger {
        name: String,
    },

    /// Trigger configuration error
    TriggerConfigError {
        field: String,
        reason: String,
    },

    /// Trigger action returned an error
    TriggerExecutionFailed {
        trigger: String,
        reason: String,
    },

    /// Scheduler loop already started
    AlreadyRunning,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTrigger {
                name,
                valid_options,
            } => {
                write!(
                    f,
                    "Unknown trigger '{}'. Valid options: {}",
                    name,
                    valid_options.join(", ")
                )
            }
            Self::DuplicateTrigger { name } => {
                write!(f, "Trigger '{}' is already registered", name)
            }
            Self::TriggerConfigError { field, reason } => {
                write!(f, "Trigger config error in '{}': {}", field, reason)
            }
            Self::TriggerExecutionFailed { trigger, reason } => {
                write!(f, "Trigger '{}' failed: {}", trigger, reason)
            }
            Self::AlreadyRunning => write!(f, "Scheduler is already running"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an unknown trigger error
    pub fn unknown_trigger(name: impl Into<String>, valid_options: Vec<String>) -> Self {
        Self::UnknownTrigger {
            name: name.into(),
            valid_options,
        }
    }

    /// Create a trigger config error
    pub fn trigger_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerConfigError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a trigger execution error
    pub fn execution(trigger: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerExecutionFailed {
            trigger: trigger.into(),
            reason: reason.into(),
        }
    }
}

impl CastwaveErrorTrait for SchedulerError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::TriggerExecutionFailed { .. })
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Scheduler
    }
}
