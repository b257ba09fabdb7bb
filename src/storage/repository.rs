//! Repository traits for entity storage
//!
//! Business logic talks to these traits only. The crate ships an in-memory
//! implementation ([`super::MemoryStore`]); a database-backed implementation
//! plugs in behind the same seams.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │   ingestion / shows / curation / feed         │
//! └───────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌───────────────────────────────────────────────┐
//! │  ContentRepository, CurationRepository,       │
//! │  ShowRepository, NudgeRepository,             │
//! │  UserRepository                               │
//! └───────────────────────────────────────────────┘
//!                        │
//!                        ▼
//!               MemoryStore (or external)
//! ```
//!
//! Status writes are last-write-wins; callers serialize work per entity
//! through the job queue.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Content, ContentStatus, CurationRecord, KnowledgeNudge, RadioShow, ShowStatus, UserProfile,
};
use crate::utils::error::StorageError;

/// Result type for repository operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ============================================================================
// Repository Traits
// ============================================================================

/// Content records
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert a new record; fails with `Conflict` if the id exists
    async fn insert_content(&self, content: &Content) -> StorageResult<()>;

    async fn get_content(&self, id: Uuid) -> StorageResult<Option<Content>>;

    /// Replace an existing record; fails with `NotFound` if absent
    async fn update_content(&self, content: &Content) -> StorageResult<()>;

    /// Returns whether a record was removed
    async fn delete_content(&self, id: Uuid) -> StorageResult<bool>;

    /// Content owned by a user, newest first, optionally filtered by status
    async fn list_contents_by_owner(
        &self,
        owner_id: &str,
        status: Option<ContentStatus>,
    ) -> StorageResult<Vec<Content>>;

    /// All content in a status, newest first
    async fn list_contents_by_status(&self, status: ContentStatus) -> StorageResult<Vec<Content>>;
}

/// Curation records, one per content id
#[async_trait]
pub trait CurationRepository: Send + Sync {
    async fn get_curation(&self, content_id: Uuid) -> StorageResult<Option<CurationRecord>>;

    async fn upsert_curation(&self, record: &CurationRecord) -> StorageResult<()>;

    async fn list_curation(&self) -> StorageResult<Vec<CurationRecord>>;

    async fn delete_curation(&self, content_id: Uuid) -> StorageResult<bool>;
}

/// Generated shows
#[async_trait]
pub trait ShowRepository: Send + Sync {
    async fn insert_show(&self, show: &RadioShow) -> StorageResult<()>;

    async fn get_show(&self, id: Uuid) -> StorageResult<Option<RadioShow>>;

    async fn update_show(&self, show: &RadioShow) -> StorageResult<()>;

    async fn delete_show(&self, id: Uuid) -> StorageResult<bool>;

    /// Shows visible to an owner (their own plus global ones), or every show
    /// when `owner_id` is `None`. Newest first.
    async fn list_shows(&self, owner_id: Option<&str>) -> StorageResult<Vec<RadioShow>>;

    async fn list_shows_by_status(&self, status: ShowStatus) -> StorageResult<Vec<RadioShow>>;
}

/// Knowledge nudges, unique per (user, content)
#[async_trait]
pub trait NudgeRepository: Send + Sync {
    /// Insert unless a nudge for the same (user, content) exists.
    /// Returns whether the nudge was stored.
    async fn insert_nudge(&self, nudge: &KnowledgeNudge) -> StorageResult<bool>;

    async fn nudge_exists(&self, user_id: &str, content_id: Uuid) -> StorageResult<bool>;

    /// Newest first
    async fn list_nudges_for_user(&self, user_id: &str) -> StorageResult<Vec<KnowledgeNudge>>;
}

/// User profiles (read-mostly collaborator data)
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &str) -> StorageResult<Option<UserProfile>>;

    async fn list_users(&self) -> StorageResult<Vec<UserProfile>>;

    async fn upsert_user(&self, profile: &UserProfile) -> StorageResult<()>;
}
