//! Personalized feed ranking
//!
//! Three pools are scored separately: completed content, ready shows (the
//! listener's own and global ones) and the listener's nudges. Each pool is
//! sorted by score, then the page is assembled round-robin
//! (content, show, nudge, repeat) so no single type crowds out the others.

pub mod scoring;

pub use scoring::{base_score, recency_bonus, Candidate, FeedSignals, FeedWeights};

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Content, ContentStatus, KnowledgeNudge, RadioShow, ShowStatus, UserProfile};
use crate::storage::Repositories;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem {
    Content(Content),
    Show(RadioShow),
    Nudge(KnowledgeNudge),
}

impl FeedItem {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Content(c) => c.id,
            Self::Show(s) => s.id,
            Self::Nudge(n) => n.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content(_) => "content",
            Self::Show(_) => "show",
            Self::Nudge(_) => "nudge",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Content(c) => &c.title,
            Self::Show(s) => &s.title,
            Self::Nudge(n) => &n.text,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    pub score: f64,
    #[serde(flatten)]
    pub item: FeedItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub user_id: String,
    pub entries: Vec<FeedEntry>,
    pub offset: usize,
    pub limit: usize,
    /// Candidates across all pools after deduplication
    pub total: usize,
}

impl FeedPage {
    pub fn has_more(&self) -> bool {
        self.offset + self.entries.len() < self.total
    }
}

pub struct FeedRanker {
    repos: Repositories,
    weights: FeedWeights,
    rng: Mutex<ChaCha8Rng>,
}

impl FeedRanker {
    pub fn new(repos: Repositories, weights: FeedWeights) -> Self {
        Self {
            repos,
            weights,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    /// Reproducible jitter
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(ChaCha8Rng::seed_from_u64(seed));
        self
    }

    pub fn weights(&self) -> &FeedWeights {
        &self.weights
    }

    fn jitter(&self) -> f64 {
        if self.weights.jitter <= 0.0 {
            return 0.0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0.0..self.weights.jitter)
    }

    fn score(&self, candidate: &Candidate<'_>, signals: &FeedSignals, now: DateTime<Utc>) -> f64 {
        base_score(candidate, signals, now, &self.weights) + self.jitter()
    }

    pub async fn build_page(&self, user_id: &str, limit: usize, offset: usize) -> Result<FeedPage> {
        let now = Utc::now();
        let profile = self
            .repos
            .users
            .get_user(user_id)
            .await?
            .unwrap_or_else(|| UserProfile::new(user_id));

        let completed = self
            .repos
            .contents
            .list_contents_by_status(ContentStatus::Completed)
            .await?;
        let topics_by_id: HashMap<Uuid, &BTreeSet<String>> =
            completed.iter().map(|c| (c.id, &c.topics)).collect();

        let liked_topics: BTreeSet<String> = profile
            .liked_content_ids
            .iter()
            .filter_map(|id| topics_by_id.get(id))
            .flat_map(|topics| topics.iter().cloned())
            .collect();
        let signals = FeedSignals::new(&profile, liked_topics);

        // Content pool, one entry per distinct text
        let mut contents: Vec<FeedEntry> = completed
            .iter()
            .map(|content| {
                let candidate = Candidate {
                    topics: &content.topics,
                    created_at: content.created_at,
                    owner_id: Some(content.owner_id.as_str()),
                    show_type: None,
                };
                FeedEntry {
                    score: self.score(&candidate, &signals, now),
                    item: FeedItem::Content(content.clone()),
                }
            })
            .collect();
        sort_by_score(&mut contents);
        let mut seen_hashes = HashSet::new();
        contents.retain(|entry| match &entry.item {
            FeedItem::Content(Content {
                content_hash: Some(hash),
                ..
            }) => seen_hashes.insert(hash.clone()),
            _ => true,
        });

        let mut shows: Vec<FeedEntry> = self
            .repos
            .shows
            .list_shows(Some(user_id))
            .await?
            .into_iter()
            .filter(|show| show.status == ShowStatus::Ready)
            .map(|show| {
                let topics: BTreeSet<String> = show
                    .content_ids
                    .iter()
                    .filter_map(|id| topics_by_id.get(id))
                    .flat_map(|topics| topics.iter().cloned())
                    .collect();
                let candidate = Candidate {
                    topics: &topics,
                    created_at: show.created_at,
                    owner_id: show.owner_id.as_deref(),
                    show_type: Some(show.show_type),
                };
                FeedEntry {
                    score: self.score(&candidate, &signals, now),
                    item: FeedItem::Show(show),
                }
            })
            .collect();
        sort_by_score(&mut shows);

        let mut nudges: Vec<FeedEntry> = self
            .repos
            .nudges
            .list_nudges_for_user(user_id)
            .await?
            .into_iter()
            .map(|nudge| {
                let topics = BTreeSet::from([nudge.category.clone()]);
                let candidate = Candidate {
                    topics: &topics,
                    created_at: nudge.created_at,
                    owner_id: Some(nudge.user_id.as_str()),
                    show_type: None,
                };
                FeedEntry {
                    score: self.score(&candidate, &signals, now),
                    item: FeedItem::Nudge(nudge),
                }
            })
            .collect();
        sort_by_score(&mut nudges);

        let total = contents.len() + shows.len() + nudges.len();
        debug!(
            user_id = %user_id,
            contents = contents.len(),
            shows = shows.len(),
            nudges = nudges.len(),
            "Feed candidates scored"
        );

        let entries = interleave(vec![contents, shows, nudges])
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();

        Ok(FeedPage {
            user_id: user_id.to_string(),
            entries,
            offset,
            limit,
            total,
        })
    }
}

fn sort_by_score(entries: &mut [FeedEntry]) {
    entries.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Take one from each pool in turn; exhausted pools drop out of the rotation
fn interleave<T>(pools: Vec<Vec<T>>) -> Vec<T> {
    let total = pools.iter().map(Vec::len).sum();
    let mut iters: Vec<_> = pools.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for iter in iters.iter_mut() {
            if let Some(item) = iter.next() {
                out.push(item);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewContent, ShowType, SourceFormat};
    use chrono::Duration;

    #[test]
    fn test_interleave_round_robin() {
        let merged = interleave(vec![vec!["c1", "c2", "c3", "c4"], vec!["s1"], vec!["n1", "n2"]]);
        assert_eq!(merged, vec!["c1", "s1", "n1", "c2", "n2", "c3", "c4"]);
        assert!(interleave::<u8>(vec![vec![], vec![]]).is_empty());
    }

    async fn completed(repos: &Repositories, owner: &str, text: &str, topics: &[&str]) -> Content {
        let mut content = Content::pending(NewContent::paste(owner, text), SourceFormat::PlainText);
        content.status = ContentStatus::Completed;
        content.raw_text = Some(text.to_string());
        content.compute_hash();
        content.topics = topics.iter().map(|t| t.to_string()).collect();
        repos.contents.insert_content(&content).await.unwrap();
        content
    }

    async fn ready_show(repos: &Repositories, owner: Option<&str>, sources: Vec<Uuid>) -> RadioShow {
        let mut show = RadioShow::generating(owner.map(String::from), "show", ShowType::Talk, sources);
        show.status = ShowStatus::Ready;
        repos.shows.insert_show(&show).await.unwrap();
        show
    }

    fn kinds(page: &FeedPage) -> Vec<&'static str> {
        page.entries.iter().map(|e| e.item.kind()).collect()
    }

    #[tokio::test]
    async fn test_user_without_likes_gets_diverse_page() {
        let repos = Repositories::in_memory();
        let a = completed(&repos, "u1", "alpha", &["oceans"]).await;
        completed(&repos, "u2", "beta", &["finance"]).await;
        ready_show(&repos, None, vec![a.id]).await;
        repos
            .nudges
            .insert_nudge(&KnowledgeNudge::new("u1", "fact", "oceans", a.id))
            .await
            .unwrap();

        let ranker = FeedRanker::new(repos, FeedWeights::default()).with_seed(7);
        let page = ranker.build_page("u1", 10, 0).await.unwrap();
        assert_eq!(kinds(&page), vec!["content", "show", "nudge", "content"]);
        assert_eq!(page.total, 4);
        assert!(!page.has_more());
    }

    #[tokio::test]
    async fn test_liked_topics_rank_first() {
        let repos = Repositories::in_memory();
        let liked = completed(&repos, "u2", "liked", &["oceans"]).await;
        let similar = completed(&repos, "u2", "similar", &["oceans", "tides"]).await;
        completed(&repos, "u2", "other", &["finance"]).await;

        let mut profile = UserProfile::new("u1");
        profile.liked_content_ids.insert(liked.id);
        repos.users.upsert_user(&profile).await.unwrap();

        let ranker = FeedRanker::new(repos, FeedWeights::default()).with_seed(1);
        let page = ranker.build_page("u1", 10, 0).await.unwrap();
        let top: Vec<Uuid> = page.entries.iter().take(2).map(|e| e.item.id()).collect();
        assert!(top.contains(&liked.id));
        assert!(top.contains(&similar.id));
    }

    #[tokio::test]
    async fn test_duplicate_text_is_collapsed() {
        let repos = Repositories::in_memory();
        completed(&repos, "u1", "same words", &[]).await;
        completed(&repos, "u2", "same words", &[]).await;
        completed(&repos, "u2", "different", &[]).await;

        let ranker = FeedRanker::new(repos, FeedWeights::default()).with_seed(3);
        let page = ranker.build_page("u1", 10, 0).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn test_other_users_shows_and_unready_shows_excluded() {
        let repos = Repositories::in_memory();
        ready_show(&repos, Some("u2"), vec![]).await;
        let mut generating = RadioShow::generating(Some("u1".into()), "wip", ShowType::News, vec![]);
        generating.status = ShowStatus::Generating;
        repos.shows.insert_show(&generating).await.unwrap();
        let own = ready_show(&repos, Some("u1"), vec![]).await;

        let ranker = FeedRanker::new(repos, FeedWeights::default());
        let page = ranker.build_page("u1", 10, 0).await.unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].item.id(), own.id);
    }

    #[tokio::test]
    async fn test_seeded_ranking_is_reproducible_and_paged() {
        let repos = Repositories::in_memory();
        for i in 0..6 {
            let mut c = completed(&repos, "u2", &format!("item {i}"), &[]).await;
            // Equal base scores so jitter decides the order
            c.created_at = Utc::now() - Duration::days(30);
            repos.contents.update_content(&c).await.unwrap();
        }

        let ids = |page: FeedPage| page.entries.into_iter().map(|e| e.item.id()).collect::<Vec<_>>();
        let first = FeedRanker::new(repos.clone(), FeedWeights::default()).with_seed(42);
        let second = FeedRanker::new(repos.clone(), FeedWeights::default()).with_seed(42);
        let all = ids(first.build_page("u1", 10, 0).await.unwrap());
        assert_eq!(all, ids(second.build_page("u1", 10, 0).await.unwrap()));

        let third = FeedRanker::new(repos, FeedWeights::default()).with_seed(42);
        let page = third.build_page("u1", 2, 2).await.unwrap();
        assert!(page.has_more());
        assert_eq!(ids(page), all[2..4].to_vec());
    }
}
