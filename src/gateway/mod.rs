//! AI capability gateway
//!
//! Uniform chat, speech, embedding and transcription interface over
//! interchangeable providers.
//!
//! # Provider selection
//!
//! 1. The provider named in the call options, if any
//! 2. Otherwise the capability-specific provider (`speech_provider`,
//!    `embedding_provider`, `transcription_provider`), then `default_provider`
//! 3. On failure only, the configured `fallback_provider`, exactly once
//!
//! Unknown providers fail with `ProviderUnavailable` and unsupported
//! capabilities with `CapabilityUnsupported`; neither triggers the fallback.
//! Embeddings never fall back so every stored vector comes from one model.

pub mod error;
pub mod json;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use error::{GatewayError, GatewayResult};
pub use provider::{
    AiProvider, AudioInput, Capability, ChatMessage, ChatOptions, ChatRole, ProviderOptions,
    SpeechOptions, SpeechOutput,
};

use crate::error::{Error, Result};
use crate::metrics;
use bytes::Bytes;
use futures::future::BoxFuture;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub(crate) fn build_rate_limiter(requests_per_second: Option<u32>) -> Option<DirectRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second?)?;
    Some(RateLimiter::direct(Quota::per_second(rate)))
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "openai_compatible")]
    OpenAi,
    Ollama,
    Mock,
}

/// One entry of the provider table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Inline API key; prefer `api_key_env`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Chat model
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub embedding_model: Option<String>,

    #[serde(default)]
    pub speech_model: Option<String>,

    #[serde(default)]
    pub transcription_model: Option<String>,

    #[serde(default)]
    pub voice: Option<String>,

    /// Restrict the advertised capabilities (kind defaults when absent)
    #[serde(default)]
    pub capabilities: Option<Vec<Capability>>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub requests_per_second: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    60
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: None,
            api_key: None,
            api_key_env: None,
            model: model.into(),
            embedding_model: None,
            speech_model: None,
            transcription_model: None,
            voice: None,
            capabilities: None,
            timeout_secs: default_timeout_secs(),
            requests_per_second: None,
        }
    }

    /// Inline key wins over the environment variable
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|name| std::env::var(name).ok())
                .filter(|key| !key.is_empty())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub default_provider: String,
    pub fallback_provider: Option<String>,
    pub embedding_provider: Option<String>,
    pub speech_provider: Option<String>,
    pub transcription_provider: Option<String>,
    /// Fixed length of every embedding vector
    pub embedding_dimensions: usize,
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let mut openai = ProviderConfig::new(ProviderKind::OpenAi, "gpt-4o-mini");
        openai.api_key_env = Some("OPENAI_API_KEY".to_string());
        openai.requests_per_second = Some(5);

        let mut ollama = ProviderConfig::new(ProviderKind::Ollama, "qwen2.5:7b");
        ollama.base_url = Some(ollama::DEFAULT_ENDPOINT.to_string());
        ollama.capabilities = Some(vec![Capability::Chat]);

        Self {
            default_provider: "openai".to_string(),
            fallback_provider: Some("ollama".to_string()),
            embedding_provider: None,
            speech_provider: None,
            transcription_provider: None,
            embedding_dimensions: 1536,
            providers: BTreeMap::from([
                ("openai".to_string(), openai),
                ("ollama".to_string(), ollama),
            ]),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.providers.contains_key(&self.default_provider) {
            anyhow::bail!(
                "default provider '{}' is not in the provider table",
                self.default_provider
            );
        }
        if let Some(fallback) = &self.fallback_provider {
            if fallback == &self.default_provider {
                anyhow::bail!("fallback provider must differ from the default provider");
            }
            if !self.providers.contains_key(fallback) {
                anyhow::bail!("fallback provider '{fallback}' is not in the provider table");
            }
        }
        for (role, id) in [
            ("embedding", &self.embedding_provider),
            ("speech", &self.speech_provider),
            ("transcription", &self.transcription_provider),
        ] {
            if let Some(id) = id {
                if !self.providers.contains_key(id) {
                    anyhow::bail!("{role} provider '{id}' is not in the provider table");
                }
            }
        }
        if self.embedding_dimensions == 0 {
            anyhow::bail!("embedding_dimensions must be greater than 0");
        }
        Ok(())
    }
}

// ============================================================================
// Replies
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    /// Provider that actually answered
    pub provider: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SpeechAudio {
    pub provider: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct EmbeddingReply {
    pub provider: String,
    pub vector: Vec<f32>,
}

// ============================================================================
// Gateway
// ============================================================================

pub struct AiGateway {
    providers: HashMap<String, Arc<dyn AiProvider>>,
    default_provider: String,
    fallback_provider: Option<String>,
    embedding_provider: Option<String>,
    speech_provider: Option<String>,
    transcription_provider: Option<String>,
    embedding_dimensions: usize,
}

impl std::fmt::Debug for AiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiGateway")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default_provider", &self.default_provider)
            .field("fallback_provider", &self.fallback_provider)
            .finish()
    }
}

impl AiGateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::default()
    }

    /// Construct every provider in the table
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(e.to_string()))?;

        let mut builder = Self::builder()
            .default_provider(&config.default_provider)
            .embedding_dimensions(config.embedding_dimensions);

        for (id, provider) in &config.providers {
            let adapter: Arc<dyn AiProvider> = match provider.kind {
                ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::new(id, provider)?),
                ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::new(id, provider)?),
                ProviderKind::Mock => Arc::new(
                    mock::MockProvider::new(id)
                        .with_embedding_dimensions(config.embedding_dimensions),
                ),
            };
            builder = builder.provider(adapter);
        }

        if let Some(id) = &config.fallback_provider {
            builder = builder.fallback_provider(id);
        }
        if let Some(id) = &config.embedding_provider {
            builder = builder.embedding_provider(id);
        }
        if let Some(id) = &config.speech_provider {
            builder = builder.speech_provider(id);
        }
        if let Some(id) = &config.transcription_provider {
            builder = builder.transcription_provider(id);
        }

        builder.build()
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn embedding_dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn resolve(&self, requested: Option<&str>) -> GatewayResult<&Arc<dyn AiProvider>> {
        let id = requested.unwrap_or(&self.default_provider);
        self.providers
            .get(id)
            .ok_or_else(|| GatewayError::ProviderUnavailable(id.to_string()))
    }

    fn fallback_for(&self, primary: &str, capability: Capability) -> Option<&Arc<dyn AiProvider>> {
        let id = self.fallback_provider.as_deref()?;
        if id == primary {
            return None;
        }
        self.providers
            .get(id)
            .filter(|provider| provider.supports(capability))
    }

    /// Run `call` on the selected provider, with at most one fallback hop
    async fn dispatch<'a, T>(
        &'a self,
        requested: Option<&'a str>,
        capability: Capability,
        allow_fallback: bool,
        call: impl Fn(&'a dyn AiProvider) -> BoxFuture<'a, GatewayResult<T>>,
    ) -> GatewayResult<(String, T)> {
        let primary = self.resolve(requested)?;
        if !primary.supports(capability) {
            return Err(GatewayError::unsupported(primary.id(), capability));
        }

        let err = match call(primary.as_ref()).await {
            Ok(value) => {
                metrics::record_gateway_call(primary.id(), capability.as_str(), "ok");
                return Ok((primary.id().to_string(), value));
            }
            Err(err) => err,
        };
        metrics::record_gateway_call(primary.id(), capability.as_str(), "error");

        let fallback = match self.fallback_for(primary.id(), capability) {
            Some(fallback) if allow_fallback && err.allows_fallback() => fallback,
            _ => return Err(err),
        };

        warn!(
            provider = primary.id(),
            fallback = fallback.id(),
            capability = %capability,
            error = %err,
            "Provider failed, trying fallback"
        );
        metrics::record_gateway_fallback(primary.id(), fallback.id());

        match call(fallback.as_ref()).await {
            Ok(value) => {
                metrics::record_gateway_call(fallback.id(), capability.as_str(), "ok");
                Ok((fallback.id().to_string(), value))
            }
            Err(fallback_err) => {
                metrics::record_gateway_call(fallback.id(), capability.as_str(), "error");
                warn!(
                    provider = fallback.id(),
                    error = %fallback_err,
                    "Fallback provider failed"
                );
                Err(fallback_err)
            }
        }
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> GatewayResult<ChatReply> {
        let (provider, text) = self
            .dispatch(options.provider.as_deref(), Capability::Chat, true, |p| {
                p.chat(messages, options)
            })
            .await?;
        debug!(provider = %provider, chars = text.len(), "Chat completed");
        Ok(ChatReply { provider, text })
    }

    pub async fn synthesize_speech(
        &self,
        text: &str,
        options: &SpeechOptions,
    ) -> GatewayResult<SpeechAudio> {
        let requested = options
            .provider
            .as_deref()
            .or(self.speech_provider.as_deref());
        let (provider, output) = self
            .dispatch(requested, Capability::Speech, true, |p| {
                p.synthesize_speech(text, options)
            })
            .await?;
        Ok(SpeechAudio {
            provider,
            mime_type: output.mime_type,
            bytes: output.bytes,
        })
    }

    pub async fn embed(&self, text: &str, options: &ProviderOptions) -> GatewayResult<EmbeddingReply> {
        let requested = options
            .provider
            .as_deref()
            .or(self.embedding_provider.as_deref());
        let (provider, vector) = self
            .dispatch(requested, Capability::Embedding, false, |p| p.embed(text))
            .await?;

        if vector.len() != self.embedding_dimensions {
            return Err(GatewayError::invalid_response(
                provider,
                format!(
                    "embedding has {} dimensions, expected {}",
                    vector.len(),
                    self.embedding_dimensions
                ),
            ));
        }

        Ok(EmbeddingReply { provider, vector })
    }

    pub async fn transcribe(&self, audio: &AudioInput, options: &ProviderOptions) -> GatewayResult<String> {
        let requested = options
            .provider
            .as_deref()
            .or(self.transcription_provider.as_deref());
        let (_, text) = self
            .dispatch(requested, Capability::Transcription, true, |p| {
                p.transcribe(audio)
            })
            .await?;
        Ok(text)
    }
}

/// Builder for [`AiGateway`]; the first registered provider is the default
/// unless one is named explicitly.
#[derive(Default)]
pub struct GatewayBuilder {
    providers: HashMap<String, Arc<dyn AiProvider>>,
    first_provider: Option<String>,
    default_provider: Option<String>,
    fallback_provider: Option<String>,
    embedding_provider: Option<String>,
    speech_provider: Option<String>,
    transcription_provider: Option<String>,
    embedding_dimensions: Option<usize>,
}

impl GatewayBuilder {
    pub fn provider(mut self, provider: Arc<dyn AiProvider>) -> Self {
        let id = provider.id().to_string();
        if self.first_provider.is_none() {
            self.first_provider = Some(id.clone());
        }
        self.providers.insert(id, provider);
        self
    }

    pub fn default_provider(mut self, id: impl Into<String>) -> Self {
        self.default_provider = Some(id.into());
        self
    }

    pub fn fallback_provider(mut self, id: impl Into<String>) -> Self {
        self.fallback_provider = Some(id.into());
        self
    }

    pub fn embedding_provider(mut self, id: impl Into<String>) -> Self {
        self.embedding_provider = Some(id.into());
        self
    }

    pub fn speech_provider(mut self, id: impl Into<String>) -> Self {
        self.speech_provider = Some(id.into());
        self
    }

    pub fn transcription_provider(mut self, id: impl Into<String>) -> Self {
        self.transcription_provider = Some(id.into());
        self
    }

    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = Some(dimensions);
        self
    }

    pub fn build(self) -> Result<AiGateway> {
        let default_provider = self
            .default_provider
            .or(self.first_provider)
            .ok_or_else(|| Error::config("gateway has no providers"))?;

        if !self.providers.contains_key(&default_provider) {
            return Err(Error::config(format!(
                "default provider '{default_provider}' is not registered"
            )));
        }
        if let Some(fallback) = &self.fallback_provider {
            if fallback == &default_provider || !self.providers.contains_key(fallback) {
                return Err(Error::config(format!(
                    "fallback provider '{fallback}' must be registered and differ from the default"
                )));
            }
        }

        Ok(AiGateway {
            providers: self.providers,
            default_provider,
            fallback_provider: self.fallback_provider,
            embedding_provider: self.embedding_provider,
            speech_provider: self.speech_provider,
            transcription_provider: self.transcription_provider,
            embedding_dimensions: self.embedding_dimensions.unwrap_or(8),
        })
    }
}
