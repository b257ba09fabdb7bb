//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use castwave::app::Services;
use castwave::config::Config;
use castwave::gateway::mock::MockProvider;
use castwave::gateway::{AiGateway, ChatMessage, ChatRole, GatewayError, GatewayResult};
use castwave::queue::{JobFamily, MemoryJobStore};

pub const EMBEDDING_DIMENSIONS: usize = 16;

/// Classification reply used for ordinary input
pub const CLASSIFY_REPLY: &str = r#"{"category": "Science", "topics": ["Oceans", "tides", "moon", "marine life"], "keywords": ["tide", "lunar", "coast"], "sentiment": "positive"}"#;

pub const SUMMARY_REPLY: &str =
    "Tides rise and fall twice a day. The moon drives them. Coastal life adapts to the rhythm.";

pub const FACT_REPLY: &str = "The moon raises a bulge of ocean water on both sides of the Earth.";

fn system_prompt(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .find(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

fn user_prompt(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

/// Space-separated script of exactly `words` words
pub fn script_of(words: usize) -> String {
    vec!["tide"; words].join(" ")
}

/// Chat responder keyed on the system prompt.
///
/// Input containing "poison" fails with an invalid response; input containing
/// "topic:<name>" is classified under that single topic instead of the
/// default ones.
pub fn scripted_responder(
    script_words: usize,
) -> impl Fn(&[ChatMessage]) -> GatewayResult<String> + Send + Sync + 'static {
    move |messages| {
        let system = system_prompt(messages);
        let user = user_prompt(messages);

        if user.contains("poison") {
            return Err(GatewayError::invalid_response("scripted", "poisoned input"));
        }
        if system.contains("You summarize") {
            return Ok(SUMMARY_REPLY.to_string());
        }
        if system.contains("You classify") {
            if let Some(topic) = user
                .split_whitespace()
                .find_map(|w| w.strip_prefix("topic:"))
            {
                return Ok(format!(
                    r#"{{"category": "{topic}", "topics": ["{topic}"], "keywords": [], "sentiment": "neutral"}}"#
                ));
            }
            return Ok(CLASSIFY_REPLY.to_string());
        }
        if system.contains("surprising") {
            return Ok(FACT_REPLY.to_string());
        }
        Ok(script_of(script_words))
    }
}

pub fn scripted_provider(id: &str, script_words: usize) -> Arc<MockProvider> {
    Arc::new(
        MockProvider::new(id)
            .with_responder(scripted_responder(script_words))
            .with_embedding_dimensions(EMBEDDING_DIMENSIONS),
    )
}

pub fn gateway_with(provider: Arc<MockProvider>) -> Arc<AiGateway> {
    Arc::new(
        AiGateway::builder()
            .provider(provider)
            .embedding_dimensions(EMBEDDING_DIMENSIONS)
            .build()
            .expect("gateway should build"),
    )
}

/// Configuration that touches neither disk nor network, with millisecond backoffs
pub fn offline_config() -> Config {
    let mut config = Config::default();
    config.storage.queue_db_path = None;
    config.shows.audio_dir = None;
    config.queue.poll_interval_ms = 5;
    for family in [
        &mut config.queue.content_processing,
        &mut config.queue.show_generation,
    ] {
        family.backoff_base_ms = 1;
        family.backoff_max_ms = 5;
    }
    config.gateway.embedding_dimensions = EMBEDDING_DIMENSIONS;
    config.feed.jitter = 0.0;
    config
}

/// Services over a scripted provider, in-memory stores and a fixed feed seed
pub fn test_services(provider: Arc<MockProvider>) -> Services {
    test_services_with(offline_config(), provider)
}

pub fn test_services_with(config: Config, provider: Arc<MockProvider>) -> Services {
    Services::builder(config)
        .gateway(gateway_with(provider))
        .job_store(Arc::new(MemoryJobStore::new()))
        .feed_seed(7)
        .build()
        .expect("services should build")
}

/// Article text of roughly `words` words mentioning the given marker
pub fn article(words: usize, marker: &str) -> String {
    let sentence = "The tide rolls in over the rocks and the pools fill with bright water";
    let mut text = String::from(marker);
    let mut count = marker.split_whitespace().count();
    while count < words {
        text.push_str(". ");
        text.push_str(sentence);
        count += sentence.split_whitespace().count();
    }
    text.push('.');
    text
}

pub async fn drain_content(services: &Services) {
    services
        .drain(JobFamily::ContentProcessing)
        .await
        .expect("content queue should drain");
}

pub async fn drain_shows(services: &Services) {
    services
        .drain(JobFamily::ShowGeneration)
        .await
        .expect("show queue should drain");
}

/// Store a COMPLETED item directly, bypassing the pipeline
pub async fn insert_completed(
    services: &Services,
    owner: &str,
    text: &str,
    topics: &[&str],
) -> castwave::models::Content {
    use castwave::models::{Content, ContentStatus, NewContent, SourceFormat};

    let mut content = Content::pending(NewContent::paste(owner, text), SourceFormat::PlainText);
    content.title = text.split_whitespace().take(6).collect::<Vec<_>>().join(" ");
    content.status = ContentStatus::Completed;
    content.raw_text = Some(text.to_string());
    content.summary = Some(text.to_string());
    content.topics = topics.iter().map(|t| t.to_string()).collect();
    content.embedding = vec![0.25; EMBEDDING_DIMENSIONS];
    content.compute_hash();
    content.processed_at = Some(chrono::Utc::now());
    services
        .repos
        .contents
        .insert_content(&content)
        .await
        .expect("content should insert");
    content
}
