#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! TTL-keyed session persistence
//!
//! Sessions are opaque JSON blobs keyed by an unguessable identifier.
//! The in-memory back end suits development and single-node runs; the
//! Redis back end adds native TTL and multi-node visibility. Tenant
//! binding is enforced by the caller, which stamps the tenant into the
//! blob on save and verifies it on load.

mod error;
mod memory;
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_config::{SessionBackend, SessionConfig};
use serde_json::Value;

pub use error::SessionError;
pub use memory::MemorySessionStore;
pub use redis::RedisSessionStore;

/// TTL-keyed blob store contract
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist state under `id`, refreshing the TTL
    async fn save(&self, id: &str, state: Value, ttl: Duration) -> Result<(), SessionError>;

    /// Load state; `None` when absent or expired
    async fn load(&self, id: &str) -> Result<Option<Value>, SessionError>;

    /// Remove state
    async fn delete(&self, id: &str) -> Result<(), SessionError>;

    /// Whether unexpired state exists
    async fn exists(&self, id: &str) -> Result<bool, SessionError>;
}

/// Build the configured session store
pub fn create_store(config: &SessionConfig) -> Result<Arc<dyn SessionStore>, SessionError> {
    match config.backend {
        SessionBackend::Memory => {
            tracing::info!(max_entries = config.max_entries, "session store using memory backend");
            Ok(Arc::new(MemorySessionStore::new(config.max_entries)))
        }
        SessionBackend::Redis => {
            tracing::info!(prefix = %config.prefix, "session store using Redis backend");
            Ok(Arc::new(RedisSessionStore::new(&config.redis_url, &config.prefix)?))
        }
    }
}
