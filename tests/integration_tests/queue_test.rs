//! Job queue integration tests
//!
//! Durable SQLite-backed queues, per-entity deduplication, dead-lettering of
//! non-retryable failures and background worker pools.

use std::time::Duration;

use castwave::app::Services;
use castwave::ingestion::ContentJob;
use castwave::models::{ContentStatus, NewContent};
use castwave::queue::{JobFamily, JobStatus};
use castwave::storage::Repositories;
use tokio::sync::watch;
use uuid::Uuid;

use crate::common::{self, article, scripted_provider};

fn sqlite_services(db: &std::path::Path, repos: Repositories) -> Services {
    let mut config = common::offline_config();
    config.storage.queue_db_path = Some(db.to_path_buf());
    Services::builder(config)
        .gateway(common::gateway_with(scripted_provider("mock", 150)))
        .repositories(repos)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_queued_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state").join("queue.db");
    let repos = Repositories::in_memory();

    let id = {
        let services = sqlite_services(&db, repos.clone());
        let id = services
            .contents
            .submit(NewContent::paste("ana", article(60, "Neap tides")))
            .await
            .unwrap();
        let stats = services.queue.stats(JobFamily::ContentProcessing).await.unwrap();
        assert_eq!(stats.queued, 1);
        id
    };
    assert!(db.exists());

    let restarted = sqlite_services(&db, repos);
    let stats = restarted.drain(JobFamily::ContentProcessing).await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(
        restarted.contents.get(id).await.unwrap().status,
        ContentStatus::Completed
    );

    let stats = restarted.queue.stats(JobFamily::ContentProcessing).await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.active(), 0);
}

#[tokio::test]
async fn test_entity_in_flight_is_not_enqueued_twice() {
    let services = common::test_services(scripted_provider("mock", 150));
    let id = services
        .contents
        .submit(NewContent::paste("ana", "Sea otters hold hands while sleeping."))
        .await
        .unwrap();

    let again = services
        .queue
        .enqueue(
            JobFamily::ContentProcessing,
            id.to_string(),
            &ContentJob { content_id: id },
        )
        .await
        .unwrap();
    let stats = services.queue.stats(JobFamily::ContentProcessing).await.unwrap();
    assert_eq!(stats.queued, 1);

    let drained = services.drain(JobFamily::ContentProcessing).await.unwrap();
    assert_eq!(drained.completed, 1);
    assert_eq!(
        services.queue.get(again).await.unwrap().unwrap().status,
        JobStatus::Completed
    );

    // A finished entity can be queued again
    let fresh = services
        .queue
        .enqueue(
            JobFamily::ContentProcessing,
            id.to_string(),
            &ContentJob { content_id: id },
        )
        .await
        .unwrap();
    assert_ne!(fresh, again);
}

#[tokio::test]
async fn test_missing_entity_dead_letters_without_retry() {
    let provider = scripted_provider("mock", 150);
    let services = common::test_services(provider.clone());
    let missing = Uuid::new_v4();

    let job_id = services
        .queue
        .enqueue(
            JobFamily::ContentProcessing,
            missing.to_string(),
            &ContentJob {
                content_id: missing,
            },
        )
        .await
        .unwrap();
    let stats = services.drain(JobFamily::ContentProcessing).await.unwrap();

    assert_eq!(stats.retried, 0);
    assert_eq!(stats.dead, 1);
    assert_eq!(provider.total_calls(), 0);

    let job = services.queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Dead);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("not found"));
}

#[tokio::test]
async fn test_exhausted_job_records_attempt_count() {
    let provider = std::sync::Arc::new(
        castwave::gateway::mock::MockProvider::new("mock")
            .with_responder(common::scripted_responder(150))
            .with_embedding_dimensions(common::EMBEDDING_DIMENSIONS)
            .failing_embeddings(),
    );
    let services = common::test_services(provider);
    let id = services
        .contents
        .submit(NewContent::paste("ana", "Barnacles glue themselves head first."))
        .await
        .unwrap();
    services.drain(JobFamily::ContentProcessing).await.unwrap();

    let stats = services.queue.stats(JobFamily::ContentProcessing).await.unwrap();
    assert_eq!(stats.dead, 1);
    let error = services.contents.get(id).await.unwrap().error.unwrap();
    assert!(error.contains("exhausted 3 attempts"), "error: {error}");
}

#[tokio::test]
async fn test_background_workers_process_submissions() {
    let services = common::test_services(scripted_provider("mock", 150));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = services.spawn_workers(shutdown_rx);

    let id = services
        .contents
        .submit(NewContent::paste("ana", "Puffins nest in burrows on cliffs."))
        .await
        .unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if services.contents.get(id).await.unwrap().is_completed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(completed.is_ok(), "worker did not finish the job");

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(
        services
            .worker_pool(JobFamily::ContentProcessing)
            .stats()
            .completed,
        1
    );
}
