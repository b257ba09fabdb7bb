//! In-memory implementation of every entity repository

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::{
    ContentRepository, CurationRepository, NudgeRepository, ShowRepository, StorageResult,
    UserRepository,
};
use crate::models::{
    Content, ContentStatus, CurationRecord, KnowledgeNudge, RadioShow, ShowStatus, UserProfile,
};
use crate::utils::error::StorageError;

/// Reference store backed by hash maps
#[derive(Default)]
pub struct MemoryStore {
    contents: RwLock<HashMap<Uuid, Content>>,
    curation: RwLock<HashMap<Uuid, CurationRecord>>,
    shows: RwLock<HashMap<Uuid, RadioShow>>,
    nudges: RwLock<Vec<KnowledgeNudge>>,
    users: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored content records
    pub async fn content_count(&self) -> usize {
        self.contents.read().await.len()
    }
}

fn newest_first<T>(items: &mut [T], created: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created(item)));
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn insert_content(&self, content: &Content) -> StorageResult<()> {
        let mut contents = self.contents.write().await;
        if contents.contains_key(&content.id) {
            return Err(StorageError::Conflict {
                entity: "content",
                id: content.id.to_string(),
            });
        }
        contents.insert(content.id, content.clone());
        Ok(())
    }

    async fn get_content(&self, id: Uuid) -> StorageResult<Option<Content>> {
        Ok(self.contents.read().await.get(&id).cloned())
    }

    async fn update_content(&self, content: &Content) -> StorageResult<()> {
        let mut contents = self.contents.write().await;
        match contents.get_mut(&content.id) {
            Some(slot) => {
                *slot = content.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("content", content.id)),
        }
    }

    async fn delete_content(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.contents.write().await.remove(&id).is_some())
    }

    async fn list_contents_by_owner(
        &self,
        owner_id: &str,
        status: Option<ContentStatus>,
    ) -> StorageResult<Vec<Content>> {
        let mut items: Vec<Content> = self
            .contents
            .read()
            .await
            .values()
            .filter(|c| c.owner_id == owner_id)
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        newest_first(&mut items, |c| c.created_at);
        Ok(items)
    }

    async fn list_contents_by_status(&self, status: ContentStatus) -> StorageResult<Vec<Content>> {
        let mut items: Vec<Content> = self
            .contents
            .read()
            .await
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        newest_first(&mut items, |c| c.created_at);
        Ok(items)
    }
}

#[async_trait]
impl CurationRepository for MemoryStore {
    async fn get_curation(&self, content_id: Uuid) -> StorageResult<Option<CurationRecord>> {
        Ok(self.curation.read().await.get(&content_id).cloned())
    }

    async fn upsert_curation(&self, record: &CurationRecord) -> StorageResult<()> {
        self.curation
            .write()
            .await
            .insert(record.content_id, record.clone());
        Ok(())
    }

    async fn list_curation(&self) -> StorageResult<Vec<CurationRecord>> {
        Ok(self.curation.read().await.values().cloned().collect())
    }

    async fn delete_curation(&self, content_id: Uuid) -> StorageResult<bool> {
        Ok(self.curation.write().await.remove(&content_id).is_some())
    }
}

#[async_trait]
impl ShowRepository for MemoryStore {
    async fn insert_show(&self, show: &RadioShow) -> StorageResult<()> {
        let mut shows = self.shows.write().await;
        if shows.contains_key(&show.id) {
            return Err(StorageError::Conflict {
                entity: "show",
                id: show.id.to_string(),
            });
        }
        shows.insert(show.id, show.clone());
        Ok(())
    }

    async fn get_show(&self, id: Uuid) -> StorageResult<Option<RadioShow>> {
        Ok(self.shows.read().await.get(&id).cloned())
    }

    async fn update_show(&self, show: &RadioShow) -> StorageResult<()> {
        let mut shows = self.shows.write().await;
        match shows.get_mut(&show.id) {
            Some(slot) => {
                *slot = show.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("show", show.id)),
        }
    }

    async fn delete_show(&self, id: Uuid) -> StorageResult<bool> {
        Ok(self.shows.write().await.remove(&id).is_some())
    }

    async fn list_shows(&self, owner_id: Option<&str>) -> StorageResult<Vec<RadioShow>> {
        let mut items: Vec<RadioShow> = self
            .shows
            .read()
            .await
            .values()
            .filter(|s| match owner_id {
                Some(owner) => s.is_global() || s.owner_id.as_deref() == Some(owner),
                None => true,
            })
            .cloned()
            .collect();
        newest_first(&mut items, |s| s.created_at);
        Ok(items)
    }

    async fn list_shows_by_status(&self, status: ShowStatus) -> StorageResult<Vec<RadioShow>> {
        let mut items: Vec<RadioShow> = self
            .shows
            .read()
            .await
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        newest_first(&mut items, |s| s.created_at);
        Ok(items)
    }
}

#[async_trait]
impl NudgeRepository for MemoryStore {
    async fn insert_nudge(&self, nudge: &KnowledgeNudge) -> StorageResult<bool> {
        let mut nudges = self.nudges.write().await;
        if nudges
            .iter()
            .any(|n| n.user_id == nudge.user_id && n.content_id == nudge.content_id)
        {
            return Ok(false);
        }
        nudges.push(nudge.clone());
        Ok(true)
    }

    async fn nudge_exists(&self, user_id: &str, content_id: Uuid) -> StorageResult<bool> {
        Ok(self
            .nudges
            .read()
            .await
            .iter()
            .any(|n| n.user_id == user_id && n.content_id == content_id))
    }

    async fn list_nudges_for_user(&self, user_id: &str) -> StorageResult<Vec<KnowledgeNudge>> {
        let mut items: Vec<KnowledgeNudge> = self
            .nudges
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut items, |n| n.created_at);
        Ok(items)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: &str) -> StorageResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn list_users(&self) -> StorageResult<Vec<UserProfile>> {
        let mut users: Vec<UserProfile> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn upsert_user(&self, profile: &UserProfile) -> StorageResult<()> {
        self.users
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }
}
