//! Topic trending and relevance scoring

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::models::{Content, CurationRecord};

/// Topic frequency over recently completed content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendingSnapshot {
    /// `(topic, count)`, most frequent first
    pub topics: Vec<(String, usize)>,
    pub window_hours: i64,
    pub computed_at: Option<DateTime<Utc>>,
}

impl TrendingSnapshot {
    pub fn topic_set(&self) -> BTreeSet<String> {
        self.topics.iter().map(|(topic, _)| topic.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Count topics of content processed within `window` before `now` and keep
/// the `top_n` most frequent. Ties break alphabetically.
pub fn compute_trending(
    contents: &[Content],
    window: Duration,
    top_n: usize,
    now: DateTime<Utc>,
) -> TrendingSnapshot {
    let cutoff = now - window;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for content in contents {
        let recent = content.processed_at.unwrap_or(content.created_at) >= cutoff;
        if !content.is_completed() || !recent {
            continue;
        }
        for topic in &content.topics {
            *counts.entry(topic.as_str()).or_insert(0) += 1;
        }
    }

    let mut topics: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(topic, count)| (topic.to_string(), count))
        .collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    topics.truncate(top_n);

    TrendingSnapshot {
        topics,
        window_hours: window.num_hours(),
        computed_at: Some(now),
    }
}

/// Weights for the relevance formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceWeights {
    pub like_weight: f64,
    pub max_likes: usize,
    pub trending_weight: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            like_weight: 0.5,
            max_likes: 10,
            trending_weight: 0.25,
        }
    }
}

/// `1.0 + like_weight * min(likes, max_likes) + trending_weight * overlap`
pub fn relevance_score(
    likes: usize,
    tags: &BTreeSet<String>,
    trending: &BTreeSet<String>,
    weights: RelevanceWeights,
) -> f64 {
    let likes = likes.min(weights.max_likes) as f64;
    let overlap = tags.intersection(trending).count() as f64;
    CurationRecord::BASELINE_RELEVANCE + weights.like_weight * likes + weights.trending_weight * overlap
}
