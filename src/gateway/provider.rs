//! Provider abstraction and the request/response types shared by all adapters

use super::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Operations a provider may offer. Chat is mandatory; the rest are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Speech,
    Embedding,
    Transcription,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Speech => "speech",
            Self::Embedding => "embedding",
            Self::Transcription => "transcription",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Per-call chat options
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Explicit provider; overrides the configured default
    pub provider: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object reply
    pub json: bool,
}

impl ChatOptions {
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Per-call speech options
#[derive(Debug, Clone, Default)]
pub struct SpeechOptions {
    pub provider: Option<String>,
    pub voice: Option<String>,
}

/// Per-call provider override for embeddings and transcription
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub provider: Option<String>,
}

impl ProviderOptions {
    pub fn with_provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
        }
    }
}

/// Raw synthesized audio as returned by a provider
#[derive(Debug, Clone)]
pub struct SpeechOutput {
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Media handed to a transcription-capable provider
#[derive(Debug, Clone)]
pub struct AudioInput {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// A black-box AI capability provider.
///
/// Adapters override the optional operations they support and report them via
/// [`AiProvider::supports`]; the defaults fail with `CapabilityUnsupported`.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn id(&self) -> &str;

    fn supports(&self, capability: Capability) -> bool;

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> GatewayResult<String>;

    async fn synthesize_speech(
        &self,
        _text: &str,
        _options: &SpeechOptions,
    ) -> GatewayResult<SpeechOutput> {
        Err(GatewayError::unsupported(self.id(), Capability::Speech))
    }

    async fn embed(&self, _text: &str) -> GatewayResult<Vec<f32>> {
        Err(GatewayError::unsupported(self.id(), Capability::Embedding))
    }

    async fn transcribe(&self, _audio: &AudioInput) -> GatewayResult<String> {
        Err(GatewayError::unsupported(self.id(), Capability::Transcription))
    }
}
