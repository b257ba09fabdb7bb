//! Feed score terms

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::{ShowType, UserProfile};

/// Weights of the feed score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedWeights {
    /// Per topic shared with liked content
    pub liked_topic: f64,
    /// Per topic shared with stated preferences
    pub preferred_topic: f64,
    /// Bonus for brand-new items, decaying linearly to zero
    pub recency_max_bonus: f64,
    pub recency_horizon_hours: f64,
    /// The listener's own content
    pub ownership_bonus: f64,
    /// Shows in one of the listener's preferred formats
    pub format_bonus: f64,
    /// Random term drawn from `[0, jitter)` per item
    pub jitter: f64,
}

impl Default for FeedWeights {
    fn default() -> Self {
        Self {
            liked_topic: 10.0,
            preferred_topic: 5.0,
            recency_max_bonus: 20.0,
            recency_horizon_hours: 72.0,
            ownership_bonus: 8.0,
            format_bonus: 6.0,
            jitter: 1.0,
        }
    }
}

/// What one listener's feed is scored against
#[derive(Debug, Clone, Default)]
pub struct FeedSignals {
    pub user_id: String,
    /// Union of topics of liked content; empty when nothing is liked
    pub liked_topics: BTreeSet<String>,
    pub preferred_topics: BTreeSet<String>,
    pub preferred_formats: BTreeSet<ShowType>,
}

impl FeedSignals {
    pub fn new(profile: &UserProfile, liked_topics: BTreeSet<String>) -> Self {
        Self {
            user_id: profile.id.clone(),
            liked_topics,
            preferred_topics: profile.preferred_topics.clone(),
            preferred_formats: profile.preferred_formats.clone(),
        }
    }
}

/// Scorable view of a feed candidate
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub topics: &'a BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub owner_id: Option<&'a str>,
    pub show_type: Option<ShowType>,
}

pub fn recency_bonus(created_at: DateTime<Utc>, now: DateTime<Utc>, weights: &FeedWeights) -> f64 {
    let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
    if age_hours >= weights.recency_horizon_hours {
        return 0.0;
    }
    weights.recency_max_bonus * (1.0 - age_hours / weights.recency_horizon_hours)
}

/// Score without jitter
pub fn base_score(
    candidate: &Candidate<'_>,
    signals: &FeedSignals,
    now: DateTime<Utc>,
    weights: &FeedWeights,
) -> f64 {
    let liked = candidate.topics.intersection(&signals.liked_topics).count() as f64;
    let preferred = candidate
        .topics
        .intersection(&signals.preferred_topics)
        .count() as f64;

    let mut score = weights.liked_topic * liked
        + weights.preferred_topic * preferred
        + recency_bonus(candidate.created_at, now, weights);

    if candidate.owner_id == Some(signals.user_id.as_str()) {
        score += weights.ownership_bonus;
    }
    if candidate
        .show_type
        .is_some_and(|t| signals.preferred_formats.contains(&t))
    {
        score += weights.format_bonus;
    }
    score
}
