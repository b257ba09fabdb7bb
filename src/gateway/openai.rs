//! OpenAI-compatible HTTP adapter
//!
//! Speaks `/chat/completions`, `/audio/speech`, `/embeddings` and
//! `/audio/transcriptions`. Any server implementing that surface (OpenAI,
//! vLLM, LiteLLM, LocalAI) can be plugged in by base URL.

use super::error::{GatewayError, GatewayResult};
use super::provider::{
    AiProvider, AudioInput, Capability, ChatMessage, ChatOptions, SpeechOptions, SpeechOutput,
};
use super::{build_rate_limiter, DirectRateLimiter, ProviderConfig};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Adapter for OpenAI-compatible APIs
pub struct OpenAiProvider {
    id: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    speech_model: String,
    transcription_model: String,
    voice: String,
    capabilities: HashSet<Capability>,
    rate_limiter: Option<DirectRateLimiter>,
}

impl OpenAiProvider {
    pub fn new(id: impl Into<String>, config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let capabilities = config.capabilities.clone().map(HashSet::from_iter).unwrap_or_else(|| {
            HashSet::from([
                Capability::Chat,
                Capability::Speech,
                Capability::Embedding,
                Capability::Transcription,
            ])
        });

        Ok(Self {
            id: id.into(),
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            embedding_model: config
                .embedding_model
                .clone()
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            speech_model: config
                .speech_model
                .clone()
                .unwrap_or_else(|| "tts-1".to_string()),
            transcription_model: config
                .transcription_model
                .clone()
                .unwrap_or_else(|| "whisper-1".to_string()),
            voice: config.voice.clone().unwrap_or_else(|| "alloy".to_string()),
            capabilities,
            rate_limiter: build_rate_limiter(config.requests_per_second),
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::from_transport(&self.id, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(&self.id, status, &body));
        }

        Ok(response)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, response: Response) -> GatewayResult<T> {
        response
            .json()
            .await
            .map_err(|e| GatewayError::invalid_response(&self.id, e.to_string()))
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> GatewayResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(provider = %self.id, model = %self.model, messages = messages.len(), "Chat request");
        let response = self.send(self.post("/chat/completions").json(&body)).await?;
        let parsed: ChatResponse = self.read_json(response).await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GatewayError::invalid_response(&self.id, "no choices in reply"))
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        options: &SpeechOptions,
    ) -> GatewayResult<SpeechOutput> {
        let body = SpeechRequest {
            model: &self.speech_model,
            input: text,
            voice: options.voice.as_deref().unwrap_or(&self.voice),
            response_format: "mp3",
        };

        let response = self.send(self.post("/audio/speech").json(&body)).await?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::from_transport(&self.id, e))?;

        if bytes.is_empty() {
            return Err(GatewayError::invalid_response(&self.id, "empty audio body"));
        }

        Ok(SpeechOutput { mime_type, bytes })
    }

    async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response = self.send(self.post("/embeddings").json(&body)).await?;
        let parsed: EmbeddingResponse = self.read_json(response).await?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GatewayError::invalid_response(&self.id, "no embedding in reply"))
    }

    async fn transcribe(&self, audio: &AudioInput) -> GatewayResult<String> {
        let part = multipart::Part::bytes(audio.bytes.to_vec())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|e| GatewayError::from_transport(&self.id, e))?;
        let form = multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);

        let response = self
            .send(self.post("/audio/transcriptions").multipart(form))
            .await?;
        let parsed: TranscriptionResponse = self.read_json(response).await?;
        Ok(parsed.text)
    }
}
