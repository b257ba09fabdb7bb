//! Curation engine
//!
//! A curation pass ([`CurationEngine::refresh`]) runs three steps, each
//! tolerant of its own failures:
//!
//! 1. recuration of completed content whose curation record is missing or stale
//! 2. show synthesis per listener and configured show type
//! 3. knowledge nudge extraction for listeners with nudges enabled
//!
//! The engine also owns the trending snapshot, the relevance refresh and
//! retention cleanup, which the scheduler fires on their own intervals.

pub mod trending;

pub use trending::{compute_trending, relevance_score, RelevanceWeights, TrendingSnapshot};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::CurationConfig;
use crate::error::Result;
use crate::ingestion::ContentAnalyzer;
use crate::metrics;
use crate::models::{
    Content, ContentStatus, CurationRecord, KnowledgeNudge, ShowStatus, UserProfile,
};
use crate::shows::selection::{matches_interests, rank_for_show};
use crate::shows::{ShowRequest, ShowService};
use crate::storage::Repositories;

const DEFAULT_CATEGORY: &str = "general";

/// Which listeners a curation pass covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurationScope {
    Global,
    User(String),
}

impl std::fmt::Display for CurationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Per-step counters of one curation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurationReport {
    pub recurated: usize,
    pub recuration_failures: usize,
    pub shows_requested: usize,
    /// Show types with no matching content
    pub shows_skipped: usize,
    pub show_failures: usize,
    pub nudges_created: usize,
    pub nudge_failures: usize,
    /// Steps that could not run at all
    pub step_errors: Vec<String>,
}

impl CurationReport {
    pub fn failures(&self) -> usize {
        self.recuration_failures + self.show_failures + self.nudge_failures + self.step_errors.len()
    }
}

/// Rows removed by a retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub contents_deleted: usize,
    pub failed_shows_deleted: usize,
    pub unplayed_shows_deleted: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.contents_deleted + self.failed_shows_deleted + self.unplayed_shows_deleted
    }
}

pub struct CurationEngine {
    repos: Repositories,
    analyzer: Arc<ContentAnalyzer>,
    shows: Arc<ShowService>,
    config: CurationConfig,
    trending: RwLock<TrendingSnapshot>,
}

impl CurationEngine {
    pub fn new(
        repos: Repositories,
        analyzer: Arc<ContentAnalyzer>,
        shows: Arc<ShowService>,
        config: CurationConfig,
    ) -> Self {
        Self {
            repos,
            analyzer,
            shows,
            config,
            trending: RwLock::new(TrendingSnapshot::default()),
        }
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    fn weights(&self) -> RelevanceWeights {
        RelevanceWeights {
            like_weight: self.config.like_weight,
            max_likes: self.config.max_likes,
            trending_weight: self.config.trending_weight,
        }
    }

    /// Latest trending snapshot; empty until first computed
    pub async fn trending(&self) -> TrendingSnapshot {
        self.trending.read().await.clone()
    }

    // ========================================================================
    // Curation pass
    // ========================================================================

    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn refresh(&self, scope: CurationScope) -> Result<CurationReport> {
        let mut report = CurationReport::default();

        if let Err(e) = self.recurate(&scope, &mut report).await {
            warn!(error = %e, "Recuration step failed");
            report.step_errors.push(format!("recuration: {e}"));
        }

        let users = match self.users_in_scope(&scope).await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Could not load listeners");
                report.step_errors.push(format!("users: {e}"));
                Vec::new()
            }
        };

        if let Err(e) = self.synthesize_shows(&users, &mut report).await {
            warn!(error = %e, "Show synthesis step failed");
            report.step_errors.push(format!("shows: {e}"));
        }

        if let Err(e) = self.generate_nudges(&users, &mut report).await {
            warn!(error = %e, "Nudge step failed");
            report.step_errors.push(format!("nudges: {e}"));
        }

        info!(
            recurated = report.recurated,
            shows = report.shows_requested,
            nudges = report.nudges_created,
            failures = report.failures(),
            "Curation pass finished"
        );
        Ok(report)
    }

    async fn users_in_scope(&self, scope: &CurationScope) -> Result<Vec<UserProfile>> {
        match scope {
            CurationScope::Global => Ok(self.repos.users.list_users().await?),
            CurationScope::User(id) => {
                let profile = self
                    .repos
                    .users
                    .get_user(id)
                    .await?
                    .unwrap_or_else(|| UserProfile::new(id.clone()));
                Ok(vec![profile])
            }
        }
    }

    async fn like_counts(&self) -> Result<HashMap<Uuid, usize>> {
        let mut likes = HashMap::new();
        for user in self.repos.users.list_users().await? {
            for id in user.liked_content_ids {
                *likes.entry(id).or_insert(0) += 1;
            }
        }
        Ok(likes)
    }

    async fn recurate(&self, scope: &CurationScope, report: &mut CurationReport) -> Result<()> {
        let now = Utc::now();
        let candidates = match scope {
            CurationScope::Global => {
                self.repos
                    .contents
                    .list_contents_by_status(ContentStatus::Completed)
                    .await?
            }
            CurationScope::User(id) => {
                self.repos
                    .contents
                    .list_contents_by_owner(id, Some(ContentStatus::Completed))
                    .await?
            }
        };

        let mut stale = Vec::new();
        for content in candidates {
            let record = self.repos.curation.get_curation(content.id).await?;
            if record.map_or(true, |r| r.is_stale(self.config.max_age(), now)) {
                stale.push(content);
            }
            if stale.len() >= self.config.batch_size {
                break;
            }
        }
        if stale.is_empty() {
            debug!("No stale content to recurate");
            return Ok(());
        }

        let likes = self.like_counts().await?;
        let trending = self.trending.read().await.topic_set();

        for content in &stale {
            match self.recurate_one(content, &likes, &trending).await {
                Ok(()) => {
                    report.recurated += 1;
                    metrics::record_curation_item("recuration", "ok");
                }
                Err(e) => {
                    report.recuration_failures += 1;
                    metrics::record_curation_item("recuration", "error");
                    warn!(content_id = %content.id, error = %e, "Recuration failed, skipping item");
                }
            }
        }
        Ok(())
    }

    async fn recurate_one(
        &self,
        content: &Content,
        likes: &HashMap<Uuid, usize>,
        trending: &BTreeSet<String>,
    ) -> Result<()> {
        let text = curation_text(content);
        let classification = self.analyzer.classify(&text).await?;
        let embedding = self.analyzer.embed(&text).await?;

        let tags: BTreeSet<String> = if classification.topics.is_empty() {
            content.topics.clone()
        } else {
            classification.topics
        };
        let relevance = relevance_score(
            likes.get(&content.id).copied().unwrap_or(0),
            &tags,
            trending,
            self.weights(),
        );

        let record = CurationRecord {
            content_id: content.id,
            category: classification
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            tags,
            embedding,
            relevance,
            refreshed_at: Utc::now(),
        };
        self.repos.curation.upsert_curation(&record).await?;
        debug!(content_id = %content.id, relevance, "Content recurated");
        Ok(())
    }

    async fn synthesize_shows(&self, users: &[UserProfile], report: &mut CurationReport) -> Result<()> {
        if users.is_empty() || self.config.show_types.is_empty() {
            return Ok(());
        }
        let curation: HashMap<Uuid, CurationRecord> = self
            .repos
            .curation
            .list_curation()
            .await?
            .into_iter()
            .map(|r| (r.content_id, r))
            .collect();

        for user in users {
            let candidates = match self
                .repos
                .contents
                .list_contents_by_owner(&user.id, Some(ContentStatus::Completed))
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    report.show_failures += self.config.show_types.len();
                    warn!(user_id = %user.id, error = %e, "Could not load content for shows");
                    continue;
                }
            };
            let relevant: Vec<Content> = candidates
                .into_iter()
                .filter(|c| matches_interests(user, c, curation.get(&c.id)))
                .collect();

            for &show_type in &self.config.show_types {
                let selected = rank_for_show(relevant.clone(), &curation, show_type.auto_select_count());
                if selected.is_empty() {
                    report.shows_skipped += 1;
                    metrics::record_curation_item("show", "skipped");
                    debug!(user_id = %user.id, show_type = %show_type, "No relevant content for show");
                    continue;
                }

                let request = ShowRequest::explicit(
                    Some(user.id.clone()),
                    show_type,
                    selected.iter().map(|c| c.id).collect(),
                )
                .with_genres(user.preferred_genres.clone());

                match self.shows.request(request).await {
                    Ok(show_id) => {
                        report.shows_requested += 1;
                        metrics::record_curation_item("show", "ok");
                        debug!(user_id = %user.id, show_id = %show_id, show_type = %show_type, "Show requested");
                    }
                    Err(e) => {
                        report.show_failures += 1;
                        metrics::record_curation_item("show", "error");
                        warn!(user_id = %user.id, show_type = %show_type, error = %e, "Show request failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Every listener with nudges on draws from the whole completed pool,
    /// newest first, skipping content they were already nudged about
    async fn generate_nudges(&self, users: &[UserProfile], report: &mut CurationReport) -> Result<()> {
        if self.config.nudges_per_user == 0 || !users.iter().any(|u| u.nudges_enabled) {
            return Ok(());
        }
        let candidates = self
            .repos
            .contents
            .list_contents_by_status(ContentStatus::Completed)
            .await?;

        for user in users.iter().filter(|u| u.nudges_enabled) {
            let mut created = 0;
            for content in &candidates {
                if created >= self.config.nudges_per_user {
                    break;
                }
                match self.nudge_for(user, content).await {
                    Ok(true) => {
                        created += 1;
                        metrics::record_curation_item("nudge", "ok");
                    }
                    Ok(false) => {}
                    Err(e) => {
                        report.nudge_failures += 1;
                        metrics::record_curation_item("nudge", "error");
                        warn!(user_id = %user.id, content_id = %content.id, error = %e, "Nudge extraction failed, skipping");
                    }
                }
            }
            report.nudges_created += created;
        }
        Ok(())
    }

    /// Create one nudge for `(user, content)`; false when one already exists
    async fn nudge_for(&self, user: &UserProfile, content: &Content) -> Result<bool> {
        if self.repos.nudges.nudge_exists(&user.id, content.id).await? {
            return Ok(false);
        }
        let fact = self.analyzer.extract_fact(&curation_text(content)).await?;
        let category = match self.repos.curation.get_curation(content.id).await? {
            Some(record) => record.category,
            None => content
                .topics
                .iter()
                .next()
                .cloned()
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        };
        let nudge = KnowledgeNudge::new(user.id.clone(), fact, category, content.id);
        Ok(self.repos.nudges.insert_nudge(&nudge).await?)
    }

    // ========================================================================
    // Maintenance operations
    // ========================================================================

    /// Recount topics over the trailing window and store the snapshot
    #[instrument(skip(self))]
    pub async fn recompute_trending(&self) -> Result<TrendingSnapshot> {
        let completed = self
            .repos
            .contents
            .list_contents_by_status(ContentStatus::Completed)
            .await?;
        let snapshot = compute_trending(
            &completed,
            self.config.trending_window(),
            self.config.trending_top_n,
            Utc::now(),
        );
        info!(topics = snapshot.topics.len(), "Trending topics recomputed");
        *self.trending.write().await = snapshot.clone();
        Ok(snapshot)
    }

    /// Rescore every curation record from likes and the trending snapshot.
    /// Returns the number of records whose relevance changed.
    #[instrument(skip(self))]
    pub async fn refresh_recommendations(&self) -> Result<usize> {
        let likes = self.like_counts().await?;
        let trending = self.trending.read().await.topic_set();
        let weights = self.weights();

        let mut updated = 0;
        for mut record in self.repos.curation.list_curation().await? {
            let score = relevance_score(
                likes.get(&record.content_id).copied().unwrap_or(0),
                &record.tags,
                &trending,
                weights,
            );
            if (score - record.relevance).abs() > f64::EPSILON {
                record.relevance = score;
                self.repos.curation.upsert_curation(&record).await?;
                updated += 1;
            }
        }
        info!(updated, "Recommendation scores refreshed");
        Ok(updated)
    }

    /// Delete FAILED content, FAILED shows and never-played READY shows
    /// older than `retention`
    #[instrument(skip(self))]
    pub async fn cleanup(&self, retention: chrono::Duration) -> Result<CleanupReport> {
        let cutoff = Utc::now() - retention;
        let mut report = CleanupReport::default();

        for content in self
            .repos
            .contents
            .list_contents_by_status(ContentStatus::Failed)
            .await?
        {
            if content.updated_at < cutoff && self.repos.contents.delete_content(content.id).await? {
                self.repos.curation.delete_curation(content.id).await?;
                report.contents_deleted += 1;
            }
        }

        for show in self.repos.shows.list_shows_by_status(ShowStatus::Failed).await? {
            if show.updated_at < cutoff && self.repos.shows.delete_show(show.id).await? {
                report.failed_shows_deleted += 1;
            }
        }

        for show in self.repos.shows.list_shows_by_status(ShowStatus::Ready).await? {
            if show.played_at.is_none()
                && show.created_at < cutoff
                && self.repos.shows.delete_show(show.id).await?
            {
                report.unplayed_shows_deleted += 1;
            }
        }

        info!(
            contents = report.contents_deleted,
            failed_shows = report.failed_shows_deleted,
            unplayed_shows = report.unplayed_shows_deleted,
            "Retention cleanup finished"
        );
        Ok(report)
    }
}

/// Text the analyzer sees for an already processed item
fn curation_text(content: &Content) -> String {
    let body = content
        .raw_text
        .as_deref()
        .or(content.summary.as_deref())
        .unwrap_or_default();
    format!("{}\n\n{}", content.title, body)
}
