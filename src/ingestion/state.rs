//! Content processing state machine
//!
//! ```text
//! PENDING ──▶ PROCESSING ──┬──▶ COMPLETED
//!    ▲            ▲  │     └──▶ FAILED ──┐
//!    │            └──┘ (redelivery)      │
//!    └──────────── resubmit ─────────────┘
//! ```

use chrono::Utc;

use crate::models::{Content, ContentStatus};
use crate::utils::error::ValidationError;

/// Move `content` to `next`, stamping timestamps.
///
/// Entering PENDING or PROCESSING keeps the last error for diagnostics;
/// COMPLETED clears it and sets `processed_at`.
pub fn apply_transition(content: &mut Content, next: ContentStatus) -> Result<(), ValidationError> {
    if !content.status.can_transition_to(next) {
        return Err(ValidationError::InvalidTransition {
            from: content.status,
            to: next,
        });
    }

    let now = Utc::now();
    content.status = next;
    content.updated_at = now;
    if next == ContentStatus::Completed {
        content.processed_at = Some(now);
        content.error = None;
    }
    Ok(())
}

/// Move to FAILED from any non-terminal state, passing through PROCESSING
/// when the item never started
pub fn fail(content: &mut Content, error: impl Into<String>) -> Result<(), ValidationError> {
    if content.status == ContentStatus::Pending {
        apply_transition(content, ContentStatus::Processing)?;
    }
    if content.status != ContentStatus::Failed {
        apply_transition(content, ContentStatus::Failed)?;
    }
    content.error = Some(error.into());
    Ok(())
}
