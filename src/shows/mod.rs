//! Show generation: request, script, music, timing and audio
//!
//! [`ShowService::request`] validates sources, stores a GENERATING show and
//! enqueues a show-generation job. [`ShowGenerator::generate`] runs inside
//! that job: one chat call for the script, music lookup, duration estimate
//! and optional speech synthesis, then READY.

pub mod duration;
pub mod music;
pub mod prompts;
pub mod selection;

pub use duration::{estimate_duration_secs, script_duration_secs};
pub use music::{MusicSource, StaticMusicCatalog};
pub use prompts::ShowPrompts;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::{AiGateway, ChatMessage, ChatOptions, GatewayError, SpeechOptions};
use crate::models::{Content, ContentStatus, RadioShow, ShowStatus, ShowType};
use crate::queue::{Job, JobFamily, JobHandler, JobQueue};
use crate::storage::{AudioSink, Repositories};
use crate::utils::error::ValidationError;

/// Payload of a show-generation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowJob {
    pub show_id: Uuid,
    /// Music genres; the owner's preferred genres when empty
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Which content a show is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSelection {
    Explicit(Vec<Uuid>),
    /// Top-ranked completed content, count set by the show type
    Auto,
}

#[derive(Debug, Clone)]
pub struct ShowRequest {
    /// `None` requests a global show
    pub owner_id: Option<String>,
    pub show_type: ShowType,
    pub selection: ContentSelection,
    pub title: Option<String>,
    pub genres: Vec<String>,
}

impl ShowRequest {
    pub fn auto(owner_id: Option<String>, show_type: ShowType) -> Self {
        Self {
            owner_id,
            show_type,
            selection: ContentSelection::Auto,
            title: None,
            genres: Vec::new(),
        }
    }

    pub fn explicit(owner_id: Option<String>, show_type: ShowType, content_ids: Vec<Uuid>) -> Self {
        Self {
            selection: ContentSelection::Explicit(content_ids),
            ..Self::auto(owner_id, show_type)
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_genres(mut self, genres: Vec<String>) -> Self {
        self.genres = genres;
        self
    }
}

/// Load every id and require COMPLETED status, preserving order
async fn load_completed(repos: &Repositories, ids: &[Uuid]) -> Result<Vec<Content>> {
    let mut contents = Vec::with_capacity(ids.len());
    for &id in ids {
        let content = repos
            .contents
            .get_content(id)
            .await?
            .ok_or_else(|| ValidationError::not_found("content", id))?;
        if content.status != ContentStatus::Completed {
            return Err(ValidationError::ContentNotCompleted {
                id,
                status: content.status,
            }
            .into());
        }
        contents.push(content);
    }
    Ok(contents)
}

// ============================================================================
// Requests
// ============================================================================

pub struct ShowService {
    repos: Repositories,
    queue: Arc<JobQueue>,
}

impl ShowService {
    pub fn new(repos: Repositories, queue: Arc<JobQueue>) -> Self {
        Self { repos, queue }
    }

    /// Content ids a request resolves to. Fails before any AI call when a
    /// referenced item is missing or not COMPLETED.
    pub async fn resolve_sources(&self, request: &ShowRequest) -> Result<Vec<Uuid>> {
        match &request.selection {
            ContentSelection::Explicit(ids) => {
                if ids.is_empty() {
                    return Err(ValidationError::MissingField("content_ids").into());
                }
                load_completed(&self.repos, ids).await?;
                Ok(ids.clone())
            }
            ContentSelection::Auto => {
                let candidates = match &request.owner_id {
                    Some(owner) => {
                        self.repos
                            .contents
                            .list_contents_by_owner(owner, Some(ContentStatus::Completed))
                            .await?
                    }
                    None => {
                        self.repos
                            .contents
                            .list_contents_by_status(ContentStatus::Completed)
                            .await?
                    }
                };
                let curation: HashMap<Uuid, _> = self
                    .repos
                    .curation
                    .list_curation()
                    .await?
                    .into_iter()
                    .map(|r| (r.content_id, r))
                    .collect();

                let selected = selection::rank_for_show(
                    candidates,
                    &curation,
                    request.show_type.auto_select_count(),
                );
                if selected.is_empty() {
                    return Err(ValidationError::NoEligibleContent(request.show_type).into());
                }
                Ok(selected.into_iter().map(|c| c.id).collect())
            }
        }
    }

    /// Store a GENERATING show, enqueue its job and return the show id
    #[instrument(skip(self, request), fields(show_type = %request.show_type))]
    pub async fn request(&self, request: ShowRequest) -> Result<Uuid> {
        let content_ids = self.resolve_sources(&request).await?;
        let title = request
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_show_title(request.show_type));

        let show = RadioShow::generating(request.owner_id.clone(), title, request.show_type, content_ids);
        self.repos.shows.insert_show(&show).await?;
        self.queue
            .enqueue(
                JobFamily::ShowGeneration,
                show.id.to_string(),
                &ShowJob {
                    show_id: show.id,
                    genres: request.genres,
                },
            )
            .await?;

        info!(show_id = %show.id, sources = show.content_ids.len(), "Show requested");
        Ok(show.id)
    }

    pub async fn get(&self, id: Uuid) -> Result<RadioShow> {
        self.repos
            .shows
            .get_show(id)
            .await?
            .ok_or_else(|| ValidationError::not_found("show", id).into())
    }
}

fn default_show_title(show_type: ShowType) -> String {
    format!("{} - {}", show_type.label(), Utc::now().format("%b %d"))
}

// ============================================================================
// Generation
// ============================================================================

pub struct ShowGenerator {
    repos: Repositories,
    gateway: Arc<AiGateway>,
    prompts: ShowPrompts,
    music: Arc<dyn MusicSource>,
    audio: Option<Arc<dyn AudioSink>>,
}

impl ShowGenerator {
    pub fn new(
        repos: Repositories,
        gateway: Arc<AiGateway>,
        music: Arc<dyn MusicSource>,
        audio: Option<Arc<dyn AudioSink>>,
    ) -> Result<Self> {
        Ok(Self {
            repos,
            gateway,
            prompts: ShowPrompts::new()?,
            music,
            audio,
        })
    }

    async fn load(&self, id: Uuid) -> Result<RadioShow> {
        self.repos
            .shows
            .get_show(id)
            .await?
            .ok_or_else(|| ValidationError::not_found("show", id).into())
    }

    /// Build script, music, duration and audio for a GENERATING show.
    ///
    /// Terminal shows are returned untouched.
    #[instrument(skip(self, job), fields(show_id = %job.show_id))]
    pub async fn generate(&self, job: &ShowJob) -> Result<RadioShow> {
        let mut show = self.load(job.show_id).await?;
        if show.status.is_terminal() {
            debug!(status = %show.status, "Show already finished, skipping");
            return Ok(show);
        }

        let contents = load_completed(&self.repos, &show.content_ids).await?;
        if contents.is_empty() {
            return Err(ValidationError::NoEligibleContent(show.show_type).into());
        }

        let tracks = self.pick_tracks(&show, &job.genres).await?;
        let prompt = self
            .prompts
            .render(show.show_type, &show.title, &contents, &tracks)?;

        let messages = [ChatMessage::system(prompt.system), ChatMessage::user(prompt.context)];
        let reply = self
            .gateway
            .chat(&messages, &ChatOptions::default().with_temperature(0.7))
            .await?;
        let script = reply.text.trim().to_string();
        if script.is_empty() {
            return Err(GatewayError::invalid_response(reply.provider, "empty script").into());
        }

        let audio_ref = self.synthesize(&show, &script).await?;

        show.duration_secs = script_duration_secs(&script, tracks.len());
        show.script = Some(script);
        show.music_track_ids = tracks.into_iter().map(|t| t.id).collect();
        show.audio_ref = audio_ref;
        show.status = ShowStatus::Ready;
        show.error = None;
        show.updated_at = Utc::now();
        self.repos.shows.update_show(&show).await?;

        info!(
            duration_secs = show.duration_secs,
            tracks = show.music_track_ids.len(),
            has_audio = show.audio_ref.is_some(),
            "Show ready"
        );
        Ok(show)
    }

    async fn pick_tracks(&self, show: &RadioShow, genres: &[String]) -> Result<Vec<crate::models::MusicTrack>> {
        let count = show.show_type.music_track_count();
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut genres = genres.to_vec();
        if genres.is_empty() {
            if let Some(owner) = &show.owner_id {
                if let Some(profile) = self.repos.users.get_user(owner).await? {
                    genres = profile.preferred_genres;
                }
            }
        }
        self.music.recommend(&genres, count).await
    }

    /// Speech for the script, if an audio sink is configured and the speech
    /// provider supports it
    async fn synthesize(&self, show: &RadioShow, script: &str) -> Result<Option<String>> {
        let Some(sink) = &self.audio else {
            return Ok(None);
        };

        match self
            .gateway
            .synthesize_speech(script, &SpeechOptions::default())
            .await
        {
            Ok(audio) => Ok(Some(sink.store(show.id, &audio).await?)),
            Err(GatewayError::CapabilityUnsupported { provider, .. }) => {
                debug!(provider = %provider, "Speech not supported, show has no audio");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn record_error(&self, id: Uuid, error: &str) -> Result<()> {
        let mut show = self.load(id).await?;
        if show.status.is_terminal() {
            return Ok(());
        }
        show.error = Some(error.to_string());
        show.updated_at = Utc::now();
        self.repos.shows.update_show(&show).await?;
        Ok(())
    }

    /// Terminal failure: the queue has given up on this show
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut show = self.load(id).await?;
        if show.status.is_terminal() {
            warn!(show_id = %id, status = %show.status, "Not marking finished show as failed");
            return Ok(());
        }
        show.status = ShowStatus::Failed;
        show.error = Some(error.to_string());
        show.updated_at = Utc::now();
        self.repos.shows.update_show(&show).await?;
        error!(show_id = %id, error = %error, "Show generation failed");
        Ok(())
    }
}

// ============================================================================
// Queue handler
// ============================================================================

pub struct ShowJobHandler {
    generator: Arc<ShowGenerator>,
}

impl ShowJobHandler {
    pub fn new(generator: Arc<ShowGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl JobHandler for ShowJobHandler {
    async fn handle(&self, job: &Job) -> Result<()> {
        let payload: ShowJob = job.payload_as()?;
        match self.generator.generate(&payload).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Err(record_err) = self
                    .generator
                    .record_error(payload.show_id, &e.to_string())
                    .await
                {
                    debug!(show_id = %payload.show_id, error = %record_err, "Could not record error");
                }
                Err(e)
            }
        }
    }

    async fn on_exhausted(&self, job: &Job, error: &Error) {
        let Ok(payload) = job.payload_as::<ShowJob>() else {
            error!(job_id = %job.id, "Dead show job has an unreadable payload");
            return;
        };
        if let Err(e) = self
            .generator
            .mark_failed(payload.show_id, &error.to_string())
            .await
        {
            error!(show_id = %payload.show_id, error = %e, "Failed to mark show as failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::MockProvider;
    use crate::gateway::Capability;
    use crate::models::{NewContent, SourceFormat, UserProfile};
    use crate::storage::FsAudioSink;

    struct Fixture {
        repos: Repositories,
        queue: Arc<JobQueue>,
        provider: Arc<MockProvider>,
        service: ShowService,
        generator: ShowGenerator,
    }

    fn fixture_with(provider: MockProvider, audio: Option<Arc<dyn AudioSink>>) -> Fixture {
        let repos = Repositories::in_memory();
        let queue = Arc::new(JobQueue::in_memory());
        let provider = Arc::new(provider);
        let gateway = Arc::new(AiGateway::builder().provider(provider.clone()).build().unwrap());
        let generator = ShowGenerator::new(
            repos.clone(),
            gateway,
            Arc::new(StaticMusicCatalog::default()),
            audio,
        )
        .unwrap();
        Fixture {
            service: ShowService::new(repos.clone(), queue.clone()),
            repos,
            queue,
            provider,
            generator,
        }
    }

    async fn add_content(repos: &Repositories, owner: &str, status: ContentStatus) -> Uuid {
        let mut content = Content::pending(NewContent::paste(owner, "body text"), SourceFormat::PlainText);
        content.title = "Tide pools".into();
        content.summary = Some("Tide pools host anemones.".into());
        content.status = status;
        repos.contents.insert_content(&content).await.unwrap();
        content.id
    }

    #[tokio::test]
    async fn test_explicit_request_rejects_incomplete_content() {
        let fx = fixture_with(MockProvider::new("mock"), None);
        let done = add_content(&fx.repos, "u1", ContentStatus::Completed).await;
        let pending = add_content(&fx.repos, "u1", ContentStatus::Processing).await;

        let err = fx
            .service
            .request(ShowRequest::explicit(Some("u1".into()), ShowType::News, vec![done, pending]))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(fx.provider.total_calls(), 0);
        assert!(fx.repos.shows.list_shows(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_request_without_content_is_rejected() {
        let fx = fixture_with(MockProvider::new("mock"), None);
        let err = fx
            .service
            .request(ShowRequest::auto(Some("u1".into()), ShowType::News))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NoEligibleContent(ShowType::News))
        ));
    }

    #[tokio::test]
    async fn test_generate_music_show_with_audio() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn AudioSink> = Arc::new(FsAudioSink::new(dir.path()));
        let script = "word ".repeat(450);
        let fx = fixture_with(MockProvider::new("mock").with_reply(script), Some(sink));
        fx.repos
            .users
            .upsert_user(&UserProfile::new("u1").with_genres(["jazz"]))
            .await
            .unwrap();
        add_content(&fx.repos, "u1", ContentStatus::Completed).await;

        let show_id = fx
            .service
            .request(ShowRequest::auto(Some("u1".into()), ShowType::Music))
            .await
            .unwrap();
        let show = fx
            .generator
            .generate(&ShowJob { show_id, genres: vec![] })
            .await
            .unwrap();

        assert_eq!(show.status, ShowStatus::Ready);
        assert_eq!(show.music_track_ids.len(), 4);
        assert!(show.music_track_ids[0].starts_with("jazz-"));
        assert_eq!(show.duration_secs, estimate_duration_secs(450, 4));
        assert!(show.audio_ref.is_some());
        assert_eq!(fx.provider.speech_calls(), 1);
        assert_eq!(fx.queue.stats(JobFamily::ShowGeneration).await.unwrap().queued, 1);
    }

    #[tokio::test]
    async fn test_generate_without_speech_support_has_no_audio() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn AudioSink> = Arc::new(FsAudioSink::new(dir.path()));
        let provider = MockProvider::new("mock")
            .with_reply("short script")
            .with_capabilities(&[Capability::Chat, Capability::Embedding]);
        let fx = fixture_with(provider, Some(sink));
        let id = add_content(&fx.repos, "u1", ContentStatus::Completed).await;

        let show_id = fx
            .service
            .request(ShowRequest::explicit(None, ShowType::QuickHits, vec![id]))
            .await
            .unwrap();
        let show = fx
            .generator
            .generate(&ShowJob { show_id, genres: vec![] })
            .await
            .unwrap();
        assert_eq!(show.status, ShowStatus::Ready);
        assert!(show.audio_ref.is_none());
        assert!(show.is_global());
    }

    #[tokio::test]
    async fn test_generate_is_noop_for_terminal_show() {
        let fx = fixture_with(MockProvider::new("mock"), None);
        let id = add_content(&fx.repos, "u1", ContentStatus::Completed).await;
        let show_id = fx
            .service
            .request(ShowRequest::explicit(None, ShowType::Talk, vec![id]))
            .await
            .unwrap();
        fx.generator.mark_failed(show_id, "gave up").await.unwrap();

        let show = fx
            .generator
            .generate(&ShowJob { show_id, genres: vec![] })
            .await
            .unwrap();
        assert_eq!(show.status, ShowStatus::Failed);
        assert_eq!(fx.provider.chat_calls(), 0);
    }
}
