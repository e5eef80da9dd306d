//! Redis sliding-window store
//!
//! Entries live in one sorted set per (identity, window), scored by the
//! request timestamp in milliseconds. A probe runs prune-add-count
//! atomically per identity via MULTI/EXEC. Keys expire a grace period
//! after their window so idle identities cost nothing.

use redis::AsyncCommands;

use crate::error::RateLimitError;
use crate::window::{HOUR_WINDOW_MS, MINUTE_WINDOW_MS, WindowProbe};

/// Keyspace prefix for limiter sorted sets
const KEY_PREFIX: &str = "relay:ratelimit";

/// Grace period added to each key's TTL, in seconds
const TTL_GRACE_SECS: u64 = 60;

/// Cluster-wide sliding-window store
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Create a store for the given Redis URL
    pub fn new(url: &str) -> Result<Self, RateLimitError> {
        let client =
            redis::Client::open(url).map_err(|e| RateLimitError::Config(format!("invalid Redis URL: {e}")))?;
        Ok(Self { client })
    }

    fn keys(identity: &str) -> (String, String) {
        (
            format!("{KEY_PREFIX}:{identity}:minute"),
            format!("{KEY_PREFIX}:{identity}:hour"),
        )
    }

    /// Atomically append, prune, and count both windows
    pub(crate) async fn record(&self, identity: &str, now_ms: u64, member: &str) -> Result<WindowProbe, RateLimitError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RateLimitError::Redis(format!("failed to get connection: {e}")))?;

        let (minute_key, hour_key) = Self::keys(identity);

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, window_ms) in [(&minute_key, MINUTE_WINDOW_MS), (&hour_key, HOUR_WINDOW_MS)] {
            pipe.cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg("-inf")
                .arg(now_ms.saturating_sub(window_ms))
                .ignore()
                .cmd("ZADD")
                .arg(key)
                .arg(now_ms)
                .arg(member)
                .ignore()
                .cmd("ZCARD")
                .arg(key)
                .cmd("ZRANGE")
                .arg(key)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES")
                .cmd("EXPIRE")
                .arg(key)
                .arg(window_ms / 1000 + TTL_GRACE_SECS)
                .ignore();
        }

        let (minute_count, minute_oldest, hour_count, hour_oldest): (u32, Vec<(String, u64)>, u32, Vec<(String, u64)>) =
            pipe.query_async(&mut conn)
                .await
                .map_err(|e| RateLimitError::Redis(format!("window probe failed: {e}")))?;

        Ok(WindowProbe {
            minute_count,
            hour_count,
            minute_oldest: minute_oldest.first().map(|(_, score)| *score),
            hour_oldest: hour_oldest.first().map(|(_, score)| *score),
        })
    }

    /// Remove the member a denied probe provisionally added
    pub(crate) async fn rollback(&self, identity: &str, member: &str) -> Result<(), RateLimitError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RateLimitError::Redis(format!("failed to get connection: {e}")))?;

        let (minute_key, hour_key) = Self::keys(identity);
        let _: () = conn
            .zrem(&minute_key, member)
            .await
            .map_err(|e| RateLimitError::Redis(format!("ZREM failed: {e}")))?;
        let _: () = conn
            .zrem(&hour_key, member)
            .await
            .map_err(|e| RateLimitError::Redis(format!("ZREM failed: {e}")))?;

        Ok(())
    }
}
