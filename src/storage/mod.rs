//! Entity storage: repository traits, the in-memory store and audio sinks

pub mod audio;
pub mod memory;
pub mod repository;

pub use audio::{AudioSink, FsAudioSink};
pub use memory::MemoryStore;
pub use repository::{
    ContentRepository, CurationRepository, NudgeRepository, ShowRepository, StorageResult,
    UserRepository,
};

use std::sync::Arc;

/// Shared handles to every repository the services use
#[derive(Clone)]
pub struct Repositories {
    pub contents: Arc<dyn ContentRepository>,
    pub curation: Arc<dyn CurationRepository>,
    pub shows: Arc<dyn ShowRepository>,
    pub nudges: Arc<dyn NudgeRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    /// All repositories backed by one [`MemoryStore`]
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }

    pub fn from_store(store: Arc<MemoryStore>) -> Self {
        Self {
            contents: store.clone(),
            curation: store.clone(),
            shows: store.clone(),
            nudges: store.clone(),
            users: store,
        }
    }
}
