//! Curation integration tests
//!
//! Ingested content flows through recuration, per-listener show synthesis
//! and nudge extraction; maintenance passes rescore and clean up.

use chrono::{Duration, Utc};

use castwave::app::Services;
use castwave::curation::CurationScope;
use castwave::models::{
    ContentStatus, NewContent, RadioShow, ShowStatus, ShowType, UserProfile,
};

use super::fixtures::SAMPLE_PROFILES_JSON;
use crate::common::{
    self, article, drain_content, drain_shows, insert_completed, scripted_provider, FACT_REPLY,
};

async fn load_profiles(services: &Services) {
    let profiles: Vec<UserProfile> = serde_json::from_str(SAMPLE_PROFILES_JSON).unwrap();
    for profile in &profiles {
        services.repos.users.upsert_user(profile).await.unwrap();
    }
}

/// Three ocean pieces for ana, two history pieces for ben
async fn seeded_services() -> Services {
    let services = common::test_services(scripted_provider("mock", 300));
    load_profiles(&services).await;

    for marker in ["Spring tides", "Rock pools", "Lunar pull"] {
        services
            .contents
            .submit(NewContent::paste("ana", article(120, marker)))
            .await
            .unwrap();
    }
    for marker in [
        "topic:history about Roman roads",
        "topic:history about Viking boats",
    ] {
        services
            .contents
            .submit(NewContent::paste("ben", article(120, marker)))
            .await
            .unwrap();
    }
    drain_content(&services).await;
    services
}

// ============================================================================
// Full pass
// ============================================================================

#[tokio::test]
async fn test_global_refresh_curates_synthesizes_and_nudges() {
    let services = seeded_services().await;

    let trending = services.curation.recompute_trending().await.unwrap();
    assert_eq!(trending.topics[0].1, 3);
    assert!(trending.topic_set().contains("history"));

    let report = services.curation.refresh(CurationScope::Global).await.unwrap();
    assert_eq!(report.recurated, 5);
    assert_eq!(report.recuration_failures, 0);
    // News and quick hits for each listener
    assert_eq!(report.shows_requested, 4);
    assert_eq!(report.shows_skipped, 0);
    // ana is capped at three of the five pieces; ben has nudges disabled
    assert_eq!(report.nudges_created, 3);
    assert_eq!(report.failures(), 0);
    assert!(report.step_errors.is_empty());

    // Every trending tag counts toward relevance
    let records = services.repos.curation.list_curation().await.unwrap();
    assert_eq!(records.len(), 5);
    for record in &records {
        if record.tags.contains("history") {
            assert_eq!(record.category, "history");
            assert!((record.relevance - 1.25).abs() < 1e-9);
        } else {
            assert_eq!(record.category, "science");
            assert!((record.relevance - 2.0).abs() < 1e-9);
        }
        assert_eq!(record.embedding.len(), common::EMBEDDING_DIMENSIONS);
    }

    drain_shows(&services).await;
    let ana_shows = services.repos.shows.list_shows(Some("ana")).await.unwrap();
    assert_eq!(ana_shows.len(), 2);
    assert!(ana_shows.iter().all(|s| s.status == ShowStatus::Ready));
    let news = ana_shows
        .iter()
        .find(|s| s.show_type == ShowType::News)
        .unwrap();
    assert_eq!(news.content_ids.len(), 3);
    let quick = ana_shows
        .iter()
        .find(|s| s.show_type == ShowType::QuickHits)
        .unwrap();
    assert_eq!(quick.content_ids.len(), 1);

    let ben_shows = services.repos.shows.list_shows(Some("ben")).await.unwrap();
    assert_eq!(ben_shows.len(), 2);

    let nudges = services.repos.nudges.list_nudges_for_user("ana").await.unwrap();
    assert_eq!(nudges.len(), 3);
    assert!(nudges.iter().all(|n| n.text == FACT_REPLY));
    // Newest first, so ben's history pieces are among them
    assert_eq!(nudges.iter().filter(|n| n.category == "history").count(), 2);
    assert!(services
        .repos
        .nudges
        .list_nudges_for_user("ben")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_second_pass_skips_fresh_records_and_existing_nudges() {
    let services = seeded_services().await;
    services.curation.refresh(CurationScope::Global).await.unwrap();

    let second = services.curation.refresh(CurationScope::Global).await.unwrap();
    assert_eq!(second.recurated, 0);
    // The two pieces not yet nudged about
    assert_eq!(second.nudges_created, 2);
    assert_eq!(
        services.repos.nudges.list_nudges_for_user("ana").await.unwrap().len(),
        5
    );

    let third = services.curation.refresh(CurationScope::Global).await.unwrap();
    assert_eq!(third.nudges_created, 0);
}

#[tokio::test]
async fn test_user_scope_touches_only_that_listener() {
    let services = seeded_services().await;

    let report = services
        .curation
        .refresh(CurationScope::User("ben".into()))
        .await
        .unwrap();
    assert_eq!(report.recurated, 2);
    assert_eq!(report.shows_requested, 2);
    assert_eq!(report.nudges_created, 0);

    assert_eq!(services.repos.curation.list_curation().await.unwrap().len(), 2);
    assert!(services.repos.shows.list_shows(Some("ana")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_listener_scope_skips_shows() {
    let services = seeded_services().await;

    let report = services
        .curation
        .refresh(CurationScope::User("zed".into()))
        .await
        .unwrap();
    assert_eq!(report.recurated, 0);
    assert_eq!(report.shows_requested, 0);
    assert_eq!(report.shows_skipped, 2);
    assert_eq!(report.failures(), 0);
    // No stored profile still means nudges on
    assert_eq!(report.nudges_created, 3);
    assert_eq!(
        services.repos.nudges.list_nudges_for_user("zed").await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_failing_item_is_isolated() {
    let services = common::test_services(scripted_provider("mock", 300));
    services
        .repos
        .users
        .upsert_user(&UserProfile::new("ana").with_nudges(true))
        .await
        .unwrap();
    insert_completed(&services, "ana", "Whales sing across oceans", &["whales"]).await;
    insert_completed(&services, "ana", "poison pill in the reply", &["whales"]).await;
    insert_completed(&services, "ana", "Krill swarms feed the giants", &["krill"]).await;

    let report = services.curation.refresh(CurationScope::Global).await.unwrap();
    assert_eq!(report.recurated, 2);
    assert_eq!(report.recuration_failures, 1);
    assert_eq!(report.nudges_created, 2);
    assert_eq!(report.nudge_failures, 1);
    assert_eq!(report.shows_requested, 2);
    assert_eq!(report.failures(), 2);
    assert_eq!(services.repos.curation.list_curation().await.unwrap().len(), 2);
}

// ============================================================================
// Maintenance
// ============================================================================

#[tokio::test]
async fn test_likes_raise_relevance_on_recommendation_refresh() {
    let services = seeded_services().await;
    services.curation.refresh(CurationScope::Global).await.unwrap();

    let liked = services
        .repos
        .contents
        .list_contents_by_owner("ana", Some(ContentStatus::Completed))
        .await
        .unwrap()[0]
        .id;
    let mut ben = services.repos.users.get_user("ben").await.unwrap().unwrap();
    ben.liked_content_ids.insert(liked);
    services.repos.users.upsert_user(&ben).await.unwrap();

    let updated = services.curation.refresh_recommendations().await.unwrap();
    assert_eq!(updated, 1);
    let record = services.repos.curation.get_curation(liked).await.unwrap().unwrap();
    // baseline, no trending snapshot yet, one like
    assert!((record.relevance - 1.5).abs() < 1e-9);

    assert_eq!(services.curation.refresh_recommendations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_removes_only_expired_records() {
    let services = common::test_services(scripted_provider("mock", 300));
    let old = Utc::now() - Duration::days(45);

    let mut failed = insert_completed(&services, "ana", "Broken upload", &[]).await;
    failed.status = ContentStatus::Failed;
    failed.error = Some("extracted text is empty".into());
    failed.updated_at = old;
    services.repos.contents.update_content(&failed).await.unwrap();

    let mut recent_failed = insert_completed(&services, "ana", "Fresh failure", &[]).await;
    recent_failed.status = ContentStatus::Failed;
    services
        .repos
        .contents
        .update_content(&recent_failed)
        .await
        .unwrap();

    let kept = insert_completed(&services, "ana", "Old but completed", &["tides"]).await;

    let show = |status: ShowStatus, played: bool| {
        let mut show = RadioShow::generating(Some("ana".into()), "Old show", ShowType::News, vec![kept.id]);
        show.status = status;
        show.created_at = old;
        show.updated_at = old;
        show.played_at = played.then_some(old);
        show
    };
    for s in [
        show(ShowStatus::Failed, false),
        show(ShowStatus::Ready, false),
        show(ShowStatus::Ready, true),
    ] {
        services.repos.shows.insert_show(&s).await.unwrap();
    }

    let report = services.curation.cleanup(Duration::days(30)).await.unwrap();
    assert_eq!(report.contents_deleted, 1);
    assert_eq!(report.failed_shows_deleted, 1);
    assert_eq!(report.unplayed_shows_deleted, 1);
    assert_eq!(report.total(), 3);

    assert!(services.repos.contents.get_content(failed.id).await.unwrap().is_none());
    assert!(services.repos.contents.get_content(recent_failed.id).await.unwrap().is_some());
    assert!(services.repos.contents.get_content(kept.id).await.unwrap().is_some());
    let remaining = services.repos.shows.list_shows(Some("ana")).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].played_at.is_some());
}
