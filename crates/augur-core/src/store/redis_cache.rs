//! Redis-backed cache shared across service instances.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::CacheStore;
use crate::error::StoreError;

/// Cache over a Redis server.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Create a cache from a connection URL. No connection is made yet.
    pub fn new(connection_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
