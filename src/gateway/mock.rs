//! In-process scripted provider for tests and dry runs

use super::error::{GatewayError, GatewayResult};
use super::provider::{
    AiProvider, AudioInput, Capability, ChatMessage, ChatOptions, ChatRole, SpeechOptions,
    SpeechOutput,
};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Responder = Arc<dyn Fn(&[ChatMessage]) -> GatewayResult<String> + Send + Sync>;

/// Deterministic provider with call counters.
///
/// By default chat echoes a short acknowledgement of the last user message,
/// embeddings are a hashed bag of words and speech returns the script bytes.
pub struct MockProvider {
    id: String,
    capabilities: HashSet<Capability>,
    responder: Responder,
    embedding_dimensions: usize,
    fail_embeddings: bool,
    chat_calls: AtomicUsize,
    speech_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    transcribe_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let echo_id = id.clone();
        Self {
            id,
            capabilities: HashSet::from([
                Capability::Chat,
                Capability::Speech,
                Capability::Embedding,
                Capability::Transcription,
            ]),
            responder: Arc::new(move |messages| {
                let last = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == ChatRole::User)
                    .map(|m| crate::utils::truncate_text(&m.content, 120))
                    .unwrap_or_default();
                Ok(format!("[{echo_id}] {last}"))
            }),
            embedding_dimensions: 8,
            fail_embeddings: false,
            chat_calls: AtomicUsize::new(0),
            speech_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
        }
    }

    /// Always answer chat with `text`
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_responder(move |_| Ok(text.clone()))
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> GatewayResult<String> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Fail every chat call with a retryable 503
    pub fn failing(self) -> Self {
        let id = self.id.clone();
        self.with_responder(move |_| {
            Err(GatewayError::RequestFailed {
                provider: id.clone(),
                status: Some(503),
                message: "service unavailable".to_string(),
            })
        })
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.iter().copied().collect();
        self
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embeddings = true;
        self
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn speech_calls(&self) -> usize {
        self.speech_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.chat_calls() + self.speech_calls() + self.embed_calls() + self.transcribe_calls()
    }
}

/// Hashed bag-of-words vector, L2-normalized
fn hashed_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions.max(1)];
    for word in text.split_whitespace() {
        let digest = Sha256::digest(word.to_lowercase().as_bytes());
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(index_bytes) % vector.len() as u64) as usize;
        vector[index] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector.truncate(dimensions);
    vector
}

#[async_trait]
impl AiProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &ChatOptions) -> GatewayResult<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(messages)
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        _options: &SpeechOptions,
    ) -> GatewayResult<SpeechOutput> {
        self.speech_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SpeechOutput {
            mime_type: "audio/mpeg".to_string(),
            bytes: Bytes::copy_from_slice(text.as_bytes()),
        })
    }

    async fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(GatewayError::Timeout {
                provider: self.id.clone(),
            });
        }
        Ok(hashed_embedding(text, self.embedding_dimensions))
    }

    async fn transcribe(&self, audio: &AudioInput) -> GatewayResult<String> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "Transcript of {} ({} bytes)",
            audio.file_name,
            audio.bytes.len()
        ))
    }
}
