//! Show generation integration tests
//!
//! Request → GENERATING → script, music, duration, audio → READY, plus the
//! failure paths through the show-generation queue.

use std::sync::Arc;

use castwave::gateway::mock::MockProvider;
use castwave::gateway::Capability;
use castwave::models::{NewContent, ShowStatus, ShowType, UserProfile};
use castwave::queue::JobFamily;
use castwave::shows::ShowRequest;
use castwave::storage::{AudioSink, FsAudioSink};

use crate::common::{
    self, article, drain_content, drain_shows, insert_completed, scripted_provider,
};

// ============================================================================
// Source selection
// ============================================================================

#[tokio::test]
async fn test_quick_hits_auto_selects_exactly_one_item() {
    let services = common::test_services(scripted_provider("mock", 150));
    for marker in ["Kelp forests", "Coral bleaching", "Whale songs"] {
        services
            .contents
            .submit(NewContent::paste("ana", article(80, marker)))
            .await
            .unwrap();
    }
    drain_content(&services).await;

    let show_id = services
        .shows
        .request(ShowRequest::auto(Some("ana".into()), ShowType::QuickHits))
        .await
        .unwrap();
    assert_eq!(
        services.shows.get(show_id).await.unwrap().status,
        ShowStatus::Generating
    );
    drain_shows(&services).await;

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.status, ShowStatus::Ready);
    assert_eq!(show.content_ids.len(), 1);
    assert!(show.music_track_ids.is_empty());
    assert_eq!(show.duration_secs, 60);
    assert!(show.title.starts_with("Quick Hits"));
}

#[tokio::test]
async fn test_auto_selection_is_scoped_to_owner_unless_global() {
    let services = common::test_services(scripted_provider("mock", 150));
    insert_completed(&services, "ana", "Tide tables for the harbor", &["tides"]).await;
    insert_completed(&services, "ben", "Roman roads and milestones", &["history"]).await;

    let err = services
        .shows
        .request(ShowRequest::auto(Some("cara".into()), ShowType::News))
        .await;
    assert!(err.is_err(), "listener without content has nothing to select");

    let global = services
        .shows
        .request(ShowRequest::auto(None, ShowType::News))
        .await
        .unwrap();
    drain_shows(&services).await;

    let show = services.shows.get(global).await.unwrap();
    assert!(show.is_global());
    assert_eq!(show.status, ShowStatus::Ready);
    assert_eq!(show.content_ids.len(), 2);
}

#[tokio::test]
async fn test_request_with_unfinished_source_makes_no_ai_calls() {
    let provider = scripted_provider("mock", 150);
    let services = common::test_services(provider.clone());
    let pending = services
        .contents
        .submit(NewContent::paste("ana", "Still waiting in the queue."))
        .await
        .unwrap();
    let ready = insert_completed(&services, "ana", "Harbor seals nap on rocks", &["seals"]).await;

    let result = services
        .shows
        .request(ShowRequest::explicit(
            Some("ana".into()),
            ShowType::Talk,
            vec![ready.id, pending],
        ))
        .await;

    assert!(result.is_err());
    assert_eq!(provider.total_calls(), 0);
    assert!(services.repos.shows.list_shows(Some("ana")).await.unwrap().is_empty());
    let stats = services.queue.stats(JobFamily::ShowGeneration).await.unwrap();
    assert_eq!(stats.active(), 0);
}

// ============================================================================
// Script, music and timing
// ============================================================================

#[tokio::test]
async fn test_mixed_show_of_450_words_and_two_tracks_runs_540_seconds() {
    let services = common::test_services(scripted_provider("mock", 450));
    services
        .repos
        .users
        .upsert_user(&UserProfile::new("ana").with_genres(["jazz"]))
        .await
        .unwrap();
    let a = insert_completed(&services, "ana", "Tide pools at dawn", &["tides"]).await;
    let b = insert_completed(&services, "ana", "The moon and the sea", &["moon"]).await;

    let show_id = services
        .shows
        .request(
            ShowRequest::explicit(Some("ana".into()), ShowType::Mixed, vec![a.id, b.id])
                .with_title("Saturday Shoreline"),
        )
        .await
        .unwrap();
    drain_shows(&services).await;

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.status, ShowStatus::Ready);
    assert_eq!(show.title, "Saturday Shoreline");
    assert_eq!(show.music_track_ids, vec!["jazz-001", "jazz-002"]);
    assert_eq!(show.duration_secs, 540);
    assert_eq!(show.content_ids, vec![a.id, b.id]);
    assert_eq!(
        show.script.as_deref().map(|s| s.split_whitespace().count()),
        Some(450)
    );
    assert!(show.audio_ref.is_none(), "no audio sink configured");
}

#[tokio::test]
async fn test_requested_genres_override_profile() {
    let services = common::test_services(scripted_provider("mock", 150));
    services
        .repos
        .users
        .upsert_user(&UserProfile::new("ana").with_genres(["jazz"]))
        .await
        .unwrap();
    let a = insert_completed(&services, "ana", "Storm season begins", &["weather"]).await;

    let show_id = services
        .shows
        .request(
            ShowRequest::explicit(Some("ana".into()), ShowType::Talk, vec![a.id])
                .with_genres(vec!["lofi".into()]),
        )
        .await
        .unwrap();
    drain_shows(&services).await;

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.music_track_ids, vec!["lofi-001"]);
    // 150 words plus one track
    assert_eq!(show.duration_secs, 240);
}

// ============================================================================
// Audio
// ============================================================================

#[tokio::test]
async fn test_audio_is_written_when_sink_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::offline_config();
    config.shows.audio_dir = Some(dir.path().join("audio"));
    let provider = scripted_provider("mock", 150);
    let services = common::test_services_with(config, provider.clone());
    let a = insert_completed(&services, "ana", "Sea glass on the shore", &["beaches"]).await;

    let show_id = services
        .shows
        .request(ShowRequest::explicit(Some("ana".into()), ShowType::News, vec![a.id]))
        .await
        .unwrap();
    drain_shows(&services).await;

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.status, ShowStatus::Ready);
    let audio_ref = show.audio_ref.expect("audio should be stored");
    assert!(audio_ref.ends_with(&format!("{show_id}.mp3")));
    let bytes = std::fs::read(&audio_ref).unwrap();
    assert_eq!(bytes, show.script.unwrap().into_bytes());
    assert_eq!(provider.speech_calls(), 1);
}

#[tokio::test]
async fn test_speech_unsupported_still_produces_ready_show() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(
        MockProvider::new("chat-only")
            .with_responder(common::scripted_responder(300))
            .with_embedding_dimensions(common::EMBEDDING_DIMENSIONS)
            .with_capabilities(&[Capability::Chat, Capability::Embedding]),
    );
    let sink: Arc<dyn AudioSink> = Arc::new(FsAudioSink::new(dir.path()));
    let services = castwave::app::Services::builder(common::offline_config())
        .gateway(common::gateway_with(provider.clone()))
        .audio_sink(Some(sink))
        .build()
        .unwrap();
    let a = insert_completed(&services, "ana", "Lighthouse keepers log", &["lighthouses"]).await;

    let show_id = services
        .shows
        .request(ShowRequest::explicit(Some("ana".into()), ShowType::Knowledge, vec![a.id]))
        .await
        .unwrap();
    drain_shows(&services).await;

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.status, ShowStatus::Ready);
    assert!(show.audio_ref.is_none());
    assert_eq!(provider.speech_calls(), 0);
    assert_eq!(show.duration_secs, 120);
}

// ============================================================================
// Failure
// ============================================================================

#[tokio::test]
async fn test_script_failure_retries_then_marks_show_failed() {
    let provider = Arc::new(MockProvider::new("down").failing());
    let services = common::test_services(provider.clone());
    let a = insert_completed(&services, "ana", "Fog rolls over the bay", &["weather"]).await;

    let show_id = services
        .shows
        .request(ShowRequest::explicit(Some("ana".into()), ShowType::News, vec![a.id]))
        .await
        .unwrap();
    let stats = services.drain(JobFamily::ShowGeneration).await.unwrap();

    assert_eq!(stats.retried, 1);
    assert_eq!(stats.dead, 1);
    assert_eq!(provider.chat_calls(), 2);

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.status, ShowStatus::Failed);
    assert!(show.error.unwrap().contains("503"));
    assert!(show.script.is_none());
}

#[tokio::test]
async fn test_source_removed_before_generation_dead_letters_after_one_attempt() {
    let provider = scripted_provider("mock", 150);
    let services = common::test_services(provider.clone());
    let a = insert_completed(&services, "ana", "Tidal bores on the river", &["rivers"]).await;

    let show_id = services
        .shows
        .request(ShowRequest::explicit(Some("ana".into()), ShowType::News, vec![a.id]))
        .await
        .unwrap();
    services.repos.contents.delete_content(a.id).await.unwrap();

    let stats = services.drain(JobFamily::ShowGeneration).await.unwrap();
    assert_eq!(stats.retried, 0);
    assert_eq!(stats.dead, 1);
    assert_eq!(provider.chat_calls(), 0);

    let show = services.shows.get(show_id).await.unwrap();
    assert_eq!(show.status, ShowStatus::Failed);
    assert!(show.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn test_ready_show_is_not_regenerated() {
    let provider = scripted_provider("mock", 150);
    let services = common::test_services(provider.clone());
    let a = insert_completed(&services, "ana", "Mangroves guard the coast", &["mangroves"]).await;
    let show_id = services
        .shows
        .request(ShowRequest::explicit(Some("ana".into()), ShowType::News, vec![a.id]))
        .await
        .unwrap();
    drain_shows(&services).await;
    let calls = provider.chat_calls();

    let again = services
        .generator
        .generate(&castwave::shows::ShowJob {
            show_id,
            genres: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(again.status, ShowStatus::Ready);
    assert_eq!(provider.chat_calls(), calls);
}
