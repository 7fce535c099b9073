//! In-process store implementations for development, the demo binary and tests.

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{
    CacheStore, ConversationRecord, CounterStore, MessageCounter, MessageRecord, NewConversation,
    TranscriptStore,
};
use crate::error::StoreError;

/// Counter rows keyed by user.
#[derive(Default)]
pub struct MemoryCounterStore {
    rows: DashMap<i64, MessageCounter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row for a user, if any.
    pub fn snapshot(&self, user_id: i64) -> Option<MessageCounter> {
        self.rows.get(&user_id).map(|row| row.clone())
    }

    /// Drops a user's row.
    pub fn remove(&self, user_id: i64) {
        self.rows.remove(&user_id);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn find(&self, user_id: i64) -> Result<Option<MessageCounter>, StoreError> {
        Ok(self.snapshot(user_id))
    }

    async fn create(&self, counter: MessageCounter) -> Result<(), StoreError> {
        match self.rows.entry(counter.user_id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "message counter for user {} already exists",
                counter.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(counter);
                Ok(())
            }
        }
    }

    async fn update(&self, counter: MessageCounter) -> Result<(), StoreError> {
        match self.rows.get_mut(&counter.user_id) {
            Some(mut row) => {
                *row = counter;
                Ok(())
            }
            None => Err(StoreError::Internal(format!(
                "no message counter for user {}",
                counter.user_id
            ))),
        }
    }
}

/// Expiring string cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        self.entries
            .remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

/// Conversation and message records kept in memory.
pub struct MemoryTranscriptStore {
    conversations: RwLock<Vec<ConversationRecord>>,
    messages: RwLock<Vec<MessageRecord>>,
    next_conversation_id: AtomicI64,
}

impl Default for MemoryTranscriptStore {
    fn default() -> Self {
        Self {
            conversations: RwLock::new(Vec::new()),
            messages: RwLock::new(Vec::new()),
            next_conversation_id: AtomicI64::new(1),
        }
    }
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> Vec<ConversationRecord> {
        self.conversations
            .read()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages
            .read()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn find_conversation(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError> {
        let rows = self
            .conversations
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(rows
            .iter()
            .find(|row| row.user_id == user_id && row.session_id == session_id)
            .cloned())
    }

    async fn save_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<ConversationRecord, StoreError> {
        let record = ConversationRecord {
            id: self.next_conversation_id.fetch_add(1, Ordering::SeqCst),
            user_id: conversation.user_id,
            session_id: conversation.session_id,
            title: conversation.title,
            first_prompt: conversation.first_prompt,
        };
        let mut rows = self
            .conversations
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn save_message(&self, message: MessageRecord) -> Result<(), StoreError> {
        let mut rows = self
            .messages
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        rows.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageRole;

    #[tokio::test]
    async fn counter_create_is_unique() {
        let store = MemoryCounterStore::new();
        let row = MessageCounter {
            user_id: 1,
            next_id: 3,
        };
        store.create(row.clone()).await.expect("create");
        let err = store.create(row).await.expect_err("conflict");
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn counter_update_requires_row() {
        let store = MemoryCounterStore::new();
        let row = MessageCounter {
            user_id: 2,
            next_id: 5,
        };
        assert!(store.update(row.clone()).await.is_err());
        store.create(row).await.expect("create");
        store
            .update(MessageCounter {
                user_id: 2,
                next_id: 7,
            })
            .await
            .expect("update");
        assert_eq!(store.find(2).await.expect("find").map(|r| r.next_id), Some(7));
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Duration::from_millis(30))
            .await
            .expect("set");
        assert_eq!(cache.get("k").await.expect("get").as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("k").await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn transcript_assigns_ids_and_finds_by_session() {
        let store = MemoryTranscriptStore::new();
        let first = store
            .save_conversation(NewConversation {
                user_id: 9,
                session_id: "s1".into(),
                title: "t".into(),
                first_prompt: "p".into(),
            })
            .await
            .expect("save");
        assert_eq!(first.id, 1);
        let found = store.find_conversation(9, "s1").await.expect("find");
        assert_eq!(found, Some(first.clone()));
        assert_eq!(store.find_conversation(9, "s2").await.expect("find"), None);

        store
            .save_message(MessageRecord {
                conversation_id: first.id,
                user_id: 9,
                session_id: "s1".into(),
                role: MessageRole::User,
                content: "p".into(),
                request_id: 1,
                response_id: 2,
                parent_id: 0,
                token_usage: 0,
            })
            .await
            .expect("message");
        assert_eq!(store.messages().len(), 1);
    }
}
