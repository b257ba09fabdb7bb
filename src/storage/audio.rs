//! Audio sinks for synthesized show audio

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::repository::StorageResult;
use crate::gateway::SpeechAudio;
use crate::utils::error::StorageError;

/// Stores synthesized audio and returns a reference to it
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn store(&self, show_id: Uuid, audio: &SpeechAudio) -> StorageResult<String>;
}

/// Writes one file per show into a directory
pub struct FsAudioSink {
    dir: PathBuf,
}

impl FsAudioSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

#[async_trait]
impl AudioSink for FsAudioSink {
    async fn store(&self, show_id: Uuid, audio: &SpeechAudio) -> StorageResult<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::Backend(format!("create {}: {e}", self.dir.display())))?;

        let path = self
            .dir
            .join(format!("{show_id}.{}", extension_for(&audio.mime_type)));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StorageError::Backend(format!("create {}: {e}", path.display())))?;
        file.write_all(&audio.bytes)
            .await
            .map_err(|e| StorageError::Backend(format!("write {}: {e}", path.display())))?;
        file.flush()
            .await
            .map_err(|e| StorageError::Backend(format!("flush {}: {e}", path.display())))?;

        debug!(show_id = %show_id, path = %path.display(), bytes = audio.bytes.len(), "Stored show audio");
        Ok(path.to_string_lossy().into_owned())
    }
}
