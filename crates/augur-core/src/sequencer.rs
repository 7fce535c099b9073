//! Per-user message-id allocation.
//!
//! Ids come in pairs: the request (user message) id and the response
//! (assistant message) id directly after it. The durable counter row is the
//! authority; the cache mirror only reseeds a user whose row is gone.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::SequencerError;
use crate::store::{CACHE_TTL, CacheStore, CounterStore, MessageCounter, last_message_id_key};

/// First request id a user ever receives.
pub const INITIAL_MESSAGE_ID: i64 = 1;

/// A request/response id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIds {
    pub request_id: i64,
    pub response_id: i64,
}

impl MessageIds {
    /// Pair shown to the client when the counter is unavailable.
    pub const FALLBACK: MessageIds = MessageIds::starting_at(INITIAL_MESSAGE_ID);

    pub const fn starting_at(request_id: i64) -> Self {
        Self {
            request_id,
            response_id: request_id + 1,
        }
    }

    /// The pair issued right after this one.
    pub const fn following(&self) -> Self {
        Self::starting_at(self.request_id + 2)
    }
}

/// Issues strictly increasing, non-overlapping id pairs per user.
pub struct MessageSequencer {
    counters: Arc<dyn CounterStore>,
    cache: Arc<dyn CacheStore>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl MessageSequencer {
    pub fn new(counters: Arc<dyn CounterStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            counters,
            cache,
            locks: DashMap::new(),
        }
    }

    /// Allocates the next pair for `user_id`.
    ///
    /// Calls for the same user are serialized; calls for different users run
    /// in parallel. Any durable-store failure aborts the allocation and nothing
    /// is mirrored.
    pub async fn next_message_ids(&self, user_id: i64) -> Result<MessageIds, SequencerError> {
        let lock = self.user_lock(user_id);
        let issued = {
            let _guard = lock.lock().await;
            self.allocate(user_id).await
        };
        drop(lock);
        // Drop the entry once no other call holds or waits on it.
        self.locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
        issued
    }

    async fn allocate(&self, user_id: i64) -> Result<MessageIds, SequencerError> {
        let counter = self
            .counters
            .find(user_id)
            .await
            .map_err(|source| SequencerError::Read { user_id, source })?;

        let ids = match counter {
            Some(mut counter) => {
                let ids = MessageIds::starting_at(counter.next_id);
                counter.next_id += 2;
                self.counters
                    .update(counter)
                    .await
                    .map_err(|source| SequencerError::Write { user_id, source })?;
                ids
            }
            None => {
                let ids = match self.cached_ids(user_id).await {
                    Some(last) => last.following(),
                    None => MessageIds::FALLBACK,
                };
                self.counters
                    .create(MessageCounter {
                        user_id,
                        next_id: ids.request_id + 2,
                    })
                    .await
                    .map_err(|source| SequencerError::Write { user_id, source })?;
                ids
            }
        };

        self.mirror(user_id, ids).await;
        debug!(user_id, request_id = ids.request_id, response_id = ids.response_id, "issued message ids");
        Ok(ids)
    }

    /// Most recently issued pair, without advancing the counter.
    pub async fn last_message_ids(&self, user_id: i64) -> Result<Option<MessageIds>, SequencerError> {
        if let Some(ids) = self.cached_ids(user_id).await {
            return Ok(Some(ids));
        }
        let counter = self
            .counters
            .find(user_id)
            .await
            .map_err(|source| SequencerError::Read { user_id, source })?;
        Ok(counter
            .filter(|counter| counter.next_id > INITIAL_MESSAGE_ID)
            .map(|counter| MessageIds::starting_at(counter.next_id - 2)))
    }

    fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.locks.entry(user_id).or_default().clone()
    }

    /// Reads the cache mirror. Errors and undecodable values count as a miss.
    async fn cached_ids(&self, user_id: i64) -> Option<MessageIds> {
        let key = last_message_id_key(user_id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(ids) => Some(ids),
                Err(err) => {
                    warn!(user_id, error = %err, "ignoring undecodable message id mirror");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(user_id, error = %err, "message id mirror unavailable");
                None
            }
        }
    }

    async fn mirror(&self, user_id: i64, ids: MessageIds) {
        let payload = match serde_json::to_string(&ids) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(user_id, error = %err, "failed to encode message id mirror");
                return;
            }
        };
        if let Err(err) = self
            .cache
            .set(&last_message_id_key(user_id), &payload, CACHE_TTL)
            .await
        {
            warn!(user_id, error = %err, "failed to mirror message ids");
        }
    }
}
