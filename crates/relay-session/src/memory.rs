//! In-memory session store
//!
//! Expiry is checked lazily on access; no background sweeper. The entry
//! count is bounded: saving past the cap evicts the oldest-expiring
//! entries first.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::{SessionError, SessionStore};

#[derive(Debug, Clone)]
struct StoredSession {
    state: Value,
    expires_at: Instant,
}

/// Per-process session store with lazy eviction
pub struct MemorySessionStore {
    entries: DashMap<String, StoredSession>,
    max_entries: usize,
}

impl MemorySessionStore {
    /// Create a store holding at most `max_entries` sessions
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Evict expired entries, then oldest-expiring entries over the cap
    fn enforce_capacity(&self) {
        let now = Instant::now();
        self.entries.retain(|_, session| session.expires_at > now);

        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, id: &str, state: Value, ttl: Duration) -> Result<(), SessionError> {
        self.entries.insert(
            id.to_owned(),
            StoredSession {
                state,
                expires_at: Instant::now() + ttl,
            },
        );
        self.enforce_capacity();
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Value>, SessionError> {
        let Some(session) = self.entries.get(id) else {
            return Ok(None);
        };

        if session.expires_at <= Instant::now() {
            drop(session);
            self.entries.remove(id);
            return Ok(None);
        }

        Ok(Some(session.state.clone()))
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self.load(id).await?.is_some())
    }
}
