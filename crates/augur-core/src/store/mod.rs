//! Storage seams used by the sequencer and the conversation orchestrator.
//!
//! "Not found" is `Ok(None)`, never an error, so callers can tell an absent
//! record from an unreachable backend.

mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use memory::{MemoryCache, MemoryCounterStore, MemoryTranscriptStore};
pub use redis_cache::RedisCache;

/// Lifetime of every cache entry written by the service.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key of the last issued message-id pair for a user.
pub fn last_message_id_key(user_id: i64) -> String {
    format!("LAST_MESSAGE_ID:{user_id}")
}

/// Cache key of the running conversation history for a user session.
pub fn conversation_history_key(user_id: i64, session_id: &str) -> String {
    format!("CONVERSATION_HISTORY:{user_id}:{session_id}")
}

/// Cache key pointing at the session a user last completed an exchange in.
pub fn latest_session_key(user_id: i64) -> String {
    format!("LATEST_SESSION:{user_id}")
}

/// Durable per-user message counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCounter {
    pub user_id: i64,
    /// Next id to hand out as a request id.
    pub next_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

/// Conversation header saved after the first completed exchange of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub title: String,
    pub first_prompt: String,
}

/// Conversation header to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub user_id: i64,
    pub session_id: String,
    pub title: String,
    pub first_prompt: String,
}

/// One saved message of an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub conversation_id: i64,
    pub user_id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub request_id: i64,
    pub response_id: i64,
    /// 0 for the user message; the request id for the answer.
    pub parent_id: i64,
    pub token_usage: u64,
}

/// Durable per-user counter rows.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn find(&self, user_id: i64) -> Result<Option<MessageCounter>, StoreError>;

    /// Creates a row; fails with [`StoreError::Conflict`] if one exists.
    async fn create(&self, counter: MessageCounter) -> Result<(), StoreError>;

    async fn update(&self, counter: MessageCounter) -> Result<(), StoreError>;
}

/// String cache with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Conversation and message records.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn find_conversation(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Option<ConversationRecord>, StoreError>;

    async fn save_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<ConversationRecord, StoreError>;

    async fn save_message(&self, message: MessageRecord) -> Result<(), StoreError>;
}
