//! Content selection for auto-selected shows

use std::cmp::Ordering;
use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Content, CurationRecord, UserProfile};

/// Rank completed content by curation relevance, then recency, and keep
/// the first `count`. Uncurated items rank at the baseline relevance.
pub fn rank_for_show(
    mut candidates: Vec<Content>,
    curation: &HashMap<Uuid, CurationRecord>,
    count: usize,
) -> Vec<Content> {
    let relevance = |content: &Content| {
        curation
            .get(&content.id)
            .map_or(CurationRecord::BASELINE_RELEVANCE, |r| r.relevance)
    };

    candidates.retain(Content::is_completed);
    candidates.sort_by(|a, b| {
        relevance(b)
            .partial_cmp(&relevance(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    candidates.truncate(count);
    candidates
}

/// Whether content matches a listener's stated interests.
///
/// Topics are compared against the preferred topics, and so are curation
/// tags. A profile without preferences matches everything.
pub fn matches_interests(
    profile: &UserProfile,
    content: &Content,
    record: Option<&CurationRecord>,
) -> bool {
    if !profile.has_preferences() {
        return true;
    }
    let topic_match = content
        .topics
        .iter()
        .any(|t| profile.preferred_topics.contains(t));
    let tag_match = record.is_some_and(|r| r.tags.iter().any(|t| profile.preferred_topics.contains(t)));
    topic_match || tag_match
}
