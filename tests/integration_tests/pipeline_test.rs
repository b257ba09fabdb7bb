//! Ingestion pipeline integration tests
//!
//! Submit → extract → summarize/classify/embed → COMPLETED, with retries and
//! terminal failure driven by the content-processing queue.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use castwave::app::Services;
use castwave::gateway::mock::MockProvider;
use castwave::ingestion::{DocumentExtractor, MediaProbe};
use castwave::models::{ContentStatus, NewContent, SourceFormat};
use castwave::queue::JobFamily;
use castwave::utils::error::IngestError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::fixtures::*;
use crate::common::{self, article, drain_content, scripted_provider, EMBEDDING_DIMENSIONS};

struct FixedProbe(f64);

#[async_trait]
impl MediaProbe for FixedProbe {
    async fn duration_secs(&self, _path: &Path) -> Result<f64, IngestError> {
        Ok(self.0)
    }
}

struct CannedDocuments;

#[async_trait]
impl DocumentExtractor for CannedDocuments {
    async fn extract(&self, _path: &Path, format: SourceFormat) -> Result<String, IngestError> {
        Ok(format!("Extracted {format} text about lighthouses and fog horns."))
    }
}

fn services_with_tools(provider: Arc<MockProvider>, upload_root: &Path) -> Services {
    let mut config = common::offline_config();
    config.ingestion.upload_root = Some(upload_root.to_path_buf());
    config.ingestion.page_requests_per_second = None;
    Services::builder(config)
        .gateway(common::gateway_with(provider))
        .job_store(Arc::new(castwave::queue::MemoryJobStore::new()))
        .documents(Arc::new(CannedDocuments))
        .media_probe(Arc::new(FixedProbe(93.5)))
        .build()
        .unwrap()
}

// ============================================================================
// Happy paths
// ============================================================================

#[tokio::test]
async fn test_paste_of_500_words_completes_with_analysis() {
    let provider = scripted_provider("mock", 300);
    let services = common::test_services(provider.clone());

    let text = article(500, "Spring tides");
    let id = services
        .contents
        .submit(NewContent::paste("ana", text.clone()))
        .await
        .unwrap();

    // Acknowledged immediately, before any processing
    let pending = services.contents.get(id).await.unwrap();
    assert_eq!(pending.status, ContentStatus::Pending);
    assert_eq!(provider.total_calls(), 0);

    drain_content(&services).await;

    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.status, ContentStatus::Completed);
    assert!((3..=5).contains(&content.topics.len()), "topics: {:?}", content.topics);
    assert!(content.topics.contains("oceans"));
    assert!(content.topics.contains("marine life"));
    assert_eq!(content.embedding.len(), EMBEDDING_DIMENSIONS);
    assert_eq!(content.summary.as_deref(), Some(common::SUMMARY_REPLY));
    assert!(content.keywords.contains("lunar"));
    assert!(content.content_hash.is_some());
    assert!(content.processed_at.is_some());
    assert!(content.error.is_none());
    assert!(content.title.starts_with("Spring tides"));

    // summary + classification, one embedding
    assert_eq!(provider.chat_calls(), 2);
    assert_eq!(provider.embed_calls(), 1);
}

#[tokio::test]
async fn test_url_submission_extracts_main_text_and_title() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tides"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(SAMPLE_ARTICLE_HTML),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let services = services_with_tools(scripted_provider("mock", 300), dir.path());

    let url = format!("{}/tides", server.uri());
    let id = services
        .contents
        .submit(NewContent::url("ana", url))
        .await
        .unwrap();
    drain_content(&services).await;

    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.status, ContentStatus::Completed);
    assert_eq!(content.title, "Why the Tide Turns");
    let raw = content.raw_text.unwrap();
    assert!(raw.contains("pull of the moon"));
    assert!(!raw.contains("Copyright"));
    assert!(!raw.contains("analytics"));
    assert!(!raw.contains("Home"));
}

#[tokio::test]
async fn test_url_submission_honors_declared_charset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cafe"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=iso-8859-1")
                .set_body_bytes(LATIN1_ARTICLE_BYTES),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let services = services_with_tools(scripted_provider("mock", 300), dir.path());
    let id = services
        .contents
        .submit(NewContent::url("ana", format!("{}/cafe", server.uri())))
        .await
        .unwrap();
    drain_content(&services).await;

    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.title, "Café Science");
    assert!(content.raw_text.unwrap().contains("pêcheurs"));
}

#[tokio::test]
async fn test_uploads_use_format_specific_extraction() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("field_notes.txt"), SAMPLE_NOTES_TXT).unwrap();
    std::fs::write(dir.path().join("lighthouse.pdf"), b"%PDF-1.4 stub").unwrap();
    std::fs::write(dir.path().join("interview.mp3"), b"ID3 fake audio").unwrap();

    let provider = scripted_provider("mock", 300);
    let services = services_with_tools(provider.clone(), dir.path());

    let notes = services
        .contents
        .submit(NewContent::upload("ana", "field_notes.txt"))
        .await
        .unwrap();
    let pdf = services
        .contents
        .submit(NewContent::upload("ana", "lighthouse.pdf"))
        .await
        .unwrap();
    let audio = services
        .contents
        .submit(NewContent::upload("ana", "interview.mp3"))
        .await
        .unwrap();
    drain_content(&services).await;

    let notes = services.contents.get(notes).await.unwrap();
    assert_eq!(notes.status, ContentStatus::Completed);
    assert_eq!(notes.format, SourceFormat::PlainText);
    assert_eq!(notes.title, "field notes");
    assert!(notes.raw_text.unwrap().contains("hermit crabs"));

    let pdf = services.contents.get(pdf).await.unwrap();
    assert_eq!(pdf.status, ContentStatus::Completed);
    assert!(pdf.raw_text.unwrap().contains("lighthouses"));

    let audio = services.contents.get(audio).await.unwrap();
    assert_eq!(audio.status, ContentStatus::Completed);
    assert_eq!(audio.format, SourceFormat::Audio);
    assert_eq!(audio.media_duration_secs, Some(93.5));
    assert!(audio.raw_text.unwrap().contains("interview.mp3"));
    assert_eq!(provider.transcribe_calls(), 1);
}

// ============================================================================
// Validation and failure
// ============================================================================

#[tokio::test]
async fn test_invalid_submissions_are_rejected_synchronously() {
    let services = common::test_services(scripted_provider("mock", 300));

    assert!(services
        .contents
        .submit(NewContent::paste("ana", "   "))
        .await
        .is_err());
    assert!(services
        .contents
        .submit(NewContent::paste("", "text"))
        .await
        .is_err());
    assert!(services
        .contents
        .submit(NewContent::url("ana", "ftp://example.com/file"))
        .await
        .is_err());
    assert!(services
        .contents
        .submit(NewContent::upload("ana", "setup.exe"))
        .await
        .is_err());

    let stats = services.queue.stats(JobFamily::ContentProcessing).await.unwrap();
    assert_eq!(stats.active(), 0);
    assert!(services
        .repos
        .contents
        .list_contents_by_owner("ana", None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_embedding_failure_exhausts_retries_then_fails() {
    let provider = Arc::new(
        MockProvider::new("mock")
            .with_responder(common::scripted_responder(300))
            .with_embedding_dimensions(EMBEDDING_DIMENSIONS)
            .failing_embeddings(),
    );
    let services = common::test_services(provider.clone());

    let id = services
        .contents
        .submit(NewContent::paste("ana", article(120, "Neap tides")))
        .await
        .unwrap();
    let stats = services.drain(JobFamily::ContentProcessing).await.unwrap();

    assert_eq!(stats.retried, 2);
    assert_eq!(stats.dead, 1);
    assert_eq!(provider.embed_calls(), 3);

    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.status, ContentStatus::Failed);
    assert!(content.error.unwrap().contains("timed out"));
    assert!(content.embedding.is_empty());
}

#[tokio::test]
async fn test_empty_page_fails_and_resubmit_recovers() {
    let server = MockServer::start().await;
    // Three job attempts see an empty page, the resubmitted one a real article
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_ARTICLE_HTML))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_ARTICLE_HTML))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let services = services_with_tools(scripted_provider("mock", 300), dir.path());
    let id = services
        .contents
        .submit(NewContent::url("ana", format!("{}/flaky", server.uri())))
        .await
        .unwrap();
    drain_content(&services).await;

    let failed = services.contents.get(id).await.unwrap();
    assert_eq!(failed.status, ContentStatus::Failed);
    assert!(failed.error.unwrap().contains("empty"));

    services.contents.resubmit(id).await.unwrap();
    assert_eq!(
        services.contents.get(id).await.unwrap().status,
        ContentStatus::Pending
    );
    drain_content(&services).await;

    let recovered = services.contents.get(id).await.unwrap();
    assert_eq!(recovered.status, ContentStatus::Completed);
    assert_eq!(recovered.title, "Why the Tide Turns");
}

#[tokio::test]
async fn test_missing_page_fails_without_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let services = services_with_tools(scripted_provider("mock", 300), dir.path());
    let id = services
        .contents
        .submit(NewContent::url("ana", format!("{}/gone", server.uri())))
        .await
        .unwrap();
    let stats = services.drain(JobFamily::ContentProcessing).await.unwrap();

    assert_eq!(stats.retried, 0);
    assert_eq!(stats.dead, 1);
    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.status, ContentStatus::Failed);
    assert!(content.error.unwrap().contains("HTTP 404"));
}

#[tokio::test]
async fn test_late_failure_keeps_first_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let services = services_with_tools(scripted_provider("mock", 300), dir.path());
    let id = services
        .contents
        .submit(NewContent::url("ana", format!("{}/gone", server.uri())))
        .await
        .unwrap();
    drain_content(&services).await;

    // A second exhaustion of the same item, e.g. from a reclaimed attempt
    services
        .pipeline
        .mark_failed(id, "operation timed out after 900s")
        .await
        .unwrap();

    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.status, ContentStatus::Failed);
    assert!(content.error.unwrap().contains("HTTP 410"));
}

#[tokio::test]
async fn test_oversized_page_is_not_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_ARTICLE_HTML.repeat(50)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = common::offline_config();
    config.ingestion.upload_root = Some(dir.path().to_path_buf());
    config.ingestion.page_requests_per_second = None;
    config.ingestion.max_page_bytes = 1024;
    let services = common::test_services_with(config, scripted_provider("mock", 300));

    let id = services
        .contents
        .submit(NewContent::url("ana", format!("{}/huge", server.uri())))
        .await
        .unwrap();
    let stats = services.drain(JobFamily::ContentProcessing).await.unwrap();

    assert_eq!(stats.dead, 1);
    let content = services.contents.get(id).await.unwrap();
    assert_eq!(content.status, ContentStatus::Failed);
    assert!(content.error.unwrap().contains("larger than 1024 bytes"));
}

#[tokio::test]
async fn test_resubmit_requires_failed_status() {
    let services = common::test_services(scripted_provider("mock", 300));
    let id = services
        .contents
        .submit(NewContent::paste("ana", "A short note about kelp forests."))
        .await
        .unwrap();
    drain_content(&services).await;

    assert!(services.contents.resubmit(id).await.is_err());
    assert_eq!(
        services.contents.get(id).await.unwrap().status,
        ContentStatus::Completed
    );
}

#[tokio::test]
async fn test_reprocessing_completed_content_is_a_no_op() {
    let provider = scripted_provider("mock", 300);
    let services = common::test_services(provider.clone());
    let id = services
        .contents
        .submit(NewContent::paste("ana", "Kelp grows half a meter a day."))
        .await
        .unwrap();
    drain_content(&services).await;
    let calls = provider.total_calls();

    let again = services.pipeline.process(id).await.unwrap();
    assert_eq!(again.status, ContentStatus::Completed);
    assert_eq!(provider.total_calls(), calls);
}
