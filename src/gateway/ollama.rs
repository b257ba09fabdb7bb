//! Ollama adapter (`/api/chat`, `/api/embeddings`); no speech support

use super::error::{GatewayError, GatewayResult};
use super::provider::{AiProvider, Capability, ChatMessage, ChatOptions};
use super::{build_rate_limiter, DirectRateLimiter, ProviderConfig};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Ollama chat request
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama chat response
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

pub struct OllamaProvider {
    id: String,
    client: Client,
    endpoint: String,
    model: String,
    embedding_model: String,
    capabilities: HashSet<Capability>,
    rate_limiter: Option<DirectRateLimiter>,
}

impl OllamaProvider {
    pub fn new(id: impl Into<String>, config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let capabilities = config
            .capabilities
            .clone()
            .map(HashSet::from_iter)
            .unwrap_or_else(|| HashSet::from([Capability::Chat, Capability::Embedding]));

        Ok(Self {
            id: id.into(),
            client,
            endpoint: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            embedding_model: config
                .embedding_model
                .clone()
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            capabilities,
            rate_limiter: build_rate_limiter(config.requests_per_second),
        })
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> GatewayResult<T> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&self.id, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(&self.id, status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::invalid_response(&self.id, e.to_string()))
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, capability: Capability) -> bool {
        // Ollama has no speech or transcription endpoints
        matches!(capability, Capability::Chat | Capability::Embedding)
            && self.capabilities.contains(&capability)
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> GatewayResult<String> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: options.json.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response: OllamaChatResponse = self.post_json("/api/chat", &request).await?;
        if response.message.content.trim().is_empty() {
            return Err(GatewayError::invalid_response(&self.id, "empty message"));
        }
        Ok(response.message.content)
    }

    async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        let request = OllamaEmbeddingRequest {
            model: &self.embedding_model,
            prompt: text,
        };

        let response: OllamaEmbeddingResponse = self.post_json("/api/embeddings", &request).await?;
        if response.embedding.is_empty() {
            return Err(GatewayError::invalid_response(&self.id, "empty embedding"));
        }
        Ok(response.embedding)
    }
}
