//! AI-assisted analysis of extracted text: summary, classification, embedding

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::gateway::json::parse_json;
use crate::gateway::{
    AiGateway, ChatMessage, ChatOptions, GatewayError, GatewayResult, ProviderOptions,
};
use crate::models::{normalize_label, Sentiment};
use crate::utils::truncate_text;

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize material for a personal radio station. \
Write a faithful summary of 3 to 5 sentences in plain prose. No lists, no preamble.";

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify material for a personal radio station. \
Reply with a JSON object only: {\"category\": string, \"topics\": [string], \
\"keywords\": [string], \"sentiment\": \"positive\" | \"negative\" | \"neutral\"}. \
Use 3 to 5 short lowercase topics and up to 10 keywords.";

const FACT_SYSTEM_PROMPT: &str = "You extract one surprising, self-contained fact from the \
material, in a single sentence of at most 30 words. Reply with the sentence only.";

/// Limits applied to analysis requests and replies
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisLimits {
    /// Characters of source text sent to the model
    pub max_input_chars: usize,
    pub max_topics: usize,
    pub max_keywords: usize,
    pub summary_max_tokens: u32,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            max_input_chars: 12_000,
            max_topics: 5,
            max_keywords: 10,
            summary_max_tokens: 400,
        }
    }
}

/// Topic/keyword/sentiment classification of a text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub category: Option<String>,
    pub topics: BTreeSet<String>,
    pub keywords: BTreeSet<String>,
    pub sentiment: Sentiment,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClassificationReply {
    category: Option<String>,
    topics: Vec<String>,
    keywords: Vec<String>,
    sentiment: Option<String>,
}

/// Normalize, drop blanks and duplicates, keep the first `limit` in reply order
fn capped_labels(labels: Vec<String>, limit: usize) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    for label in labels {
        let label = normalize_label(&label);
        if label.is_empty() {
            continue;
        }
        if seen.len() == limit {
            break;
        }
        seen.insert(label);
    }
    seen
}

pub struct ContentAnalyzer {
    gateway: Arc<AiGateway>,
    limits: AnalysisLimits,
}

impl ContentAnalyzer {
    pub fn new(gateway: Arc<AiGateway>) -> Self {
        Self {
            gateway,
            limits: AnalysisLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: AnalysisLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn gateway(&self) -> &Arc<AiGateway> {
        &self.gateway
    }

    fn excerpt(&self, text: &str) -> String {
        truncate_text(text, self.limits.max_input_chars)
    }

    pub async fn summarize(&self, title: &str, text: &str) -> GatewayResult<String> {
        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!("Title: {title}\n\n{}", self.excerpt(text))),
        ];
        let options = ChatOptions::default()
            .with_temperature(0.3)
            .with_max_tokens(self.limits.summary_max_tokens);
        let reply = self.gateway.chat(&messages, &options).await?;

        let summary = reply.text.trim().to_string();
        if summary.is_empty() {
            return Err(GatewayError::invalid_response(reply.provider, "empty summary"));
        }
        Ok(summary)
    }

    pub async fn classify(&self, text: &str) -> GatewayResult<Classification> {
        let messages = [
            ChatMessage::system(CLASSIFY_SYSTEM_PROMPT),
            ChatMessage::user(self.excerpt(text)),
        ];
        let options = ChatOptions::default().with_temperature(0.0).json();
        let reply = self.gateway.chat(&messages, &options).await?;
        let parsed: ClassificationReply = parse_json(&reply.provider, &reply.text)?;

        Ok(Classification {
            category: parsed
                .category
                .map(|c| normalize_label(&c))
                .filter(|c| !c.is_empty()),
            topics: capped_labels(parsed.topics, self.limits.max_topics),
            keywords: capped_labels(parsed.keywords, self.limits.max_keywords),
            sentiment: parsed
                .sentiment
                .as_deref()
                .map(Sentiment::parse_lenient)
                .unwrap_or_default(),
        })
    }

    /// Classification that never fails: errors yield empty topics and
    /// keywords with neutral sentiment
    pub async fn classify_or_default(&self, content_id: Uuid, text: &str) -> Classification {
        match self.classify(text).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(content_id = %content_id, error = %e, "Classification failed, using defaults");
                Classification::default()
            }
        }
    }

    pub async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        let reply = self
            .gateway
            .embed(&self.excerpt(text), &ProviderOptions::default())
            .await?;
        Ok(reply.vector)
    }

    /// One short standalone fact from the text
    pub async fn extract_fact(&self, text: &str) -> GatewayResult<String> {
        let messages = [
            ChatMessage::system(FACT_SYSTEM_PROMPT),
            ChatMessage::user(self.excerpt(text)),
        ];
        let options = ChatOptions::default()
            .with_temperature(0.5)
            .with_max_tokens(80);
        let reply = self.gateway.chat(&messages, &options).await?;
        let fact = reply.text.trim().trim_matches('"').trim().to_string();
        if fact.is_empty() {
            return Err(GatewayError::invalid_response(reply.provider, "empty fact"));
        }
        Ok(fact)
    }
}
