//! Redis session store
//!
//! Keyspace-prefixed string values serialized as one JSON document with
//! native TTL. Every operation runs under a bounded timeout so a slow
//! Redis cannot stall the request path.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;

use crate::{SessionError, SessionStore};

/// Bound on any single Redis operation
const OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Redis-backed session store
pub struct RedisSessionStore {
    client: redis::Client,
    prefix: String,
}

impl RedisSessionStore {
    /// Create a store for the given Redis URL and key prefix
    pub fn new(url: &str, prefix: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(|e| SessionError::Config(format!("invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            prefix: prefix.to_owned(),
        })
    }

    fn key(&self, id: &str) -> String {
        format!("{}{id}", self.prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, SessionError> {
        let connect = self.client.get_multiplexed_async_connection();
        tokio::time::timeout(OPERATION_TIMEOUT, connect)
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|e| SessionError::Redis(format!("failed to get connection: {e}")))
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(&self, id: &str, state: Value, ttl: Duration) -> Result<(), SessionError> {
        let serialized =
            serde_json::to_string(&state).map_err(|e| SessionError::Serialization(e.to_string()))?;
        let mut conn = self.connection().await?;

        let set = conn.set_ex::<_, _, ()>(self.key(id), serialized, ttl.as_secs().max(1));
        tokio::time::timeout(OPERATION_TIMEOUT, set)
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|e| SessionError::Redis(format!("SETEX failed: {e}")))
    }

    async fn load(&self, id: &str) -> Result<Option<Value>, SessionError> {
        let mut conn = self.connection().await?;

        let get = conn.get::<_, Option<String>>(self.key(id));
        let serialized = tokio::time::timeout(OPERATION_TIMEOUT, get)
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|e| SessionError::Redis(format!("GET failed: {e}")))?;

        serialized
            .map(|raw| serde_json::from_str(&raw).map_err(|e| SessionError::Serialization(e.to_string())))
            .transpose()
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let mut conn = self.connection().await?;

        let del = conn.del::<_, ()>(self.key(id));
        tokio::time::timeout(OPERATION_TIMEOUT, del)
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|e| SessionError::Redis(format!("DEL failed: {e}")))
    }

    async fn exists(&self, id: &str) -> Result<bool, SessionError> {
        let mut conn = self.connection().await?;

        let exists = conn.exists::<_, bool>(self.key(id));
        tokio::time::timeout(OPERATION_TIMEOUT, exists)
            .await
            .map_err(|_| SessionError::Timeout)?
            .map_err(|e| SessionError::Redis(format!("EXISTS failed: {e}")))
    }
}
