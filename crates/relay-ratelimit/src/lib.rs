#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Per-identity sliding-window rate limiting
//!
//! Two concurrent windows (minute and hour) per identity, backed by an
//! in-memory store or a cluster-wide Redis store. When Redis is
//! configured but unreachable the limiter degrades transparently to the
//! in-memory store: per-node fairness instead of refused traffic, logged
//! once per failure window.

mod error;
pub mod storage;
mod window;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use error::RateLimitError;
pub use window::{Decision, WindowCaps};

use relay_config::RateLimitConfig;
use storage::{memory::MemoryStore, redis::RedisStore};
use window::decide;

/// Seconds between degradation warnings while Redis stays down
const DEGRADED_LOG_INTERVAL_SECS: u64 = 60;

enum Store {
    Memory(MemoryStore),
    Redis {
        redis: RedisStore,
        fallback: MemoryStore,
        last_warned: AtomicU64,
    },
}

/// Sliding-window request limiter
pub struct RateLimiter {
    caps: WindowCaps,
    store: Store,
    sequence: AtomicU64,
}

impl RateLimiter {
    /// Build a limiter from configuration
    ///
    /// A configured Redis URL selects the cluster-wide store; an invalid
    /// URL is a configuration error rather than a silent downgrade.
    pub fn new(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let caps = WindowCaps {
            per_minute: config.per_minute,
            per_hour: config.per_hour,
        };

        let store = match config.redis_url {
            Some(ref url) => {
                tracing::info!("rate limiter using Redis store");
                Store::Redis {
                    redis: RedisStore::new(url)?,
                    fallback: MemoryStore::new(),
                    last_warned: AtomicU64::new(0),
                }
            }
            None => {
                tracing::info!("rate limiter using in-memory store");
                Store::Memory(MemoryStore::new())
            }
        };

        Ok(Self {
            caps,
            store,
            sequence: AtomicU64::new(0),
        })
    }

    /// Decide admission for one request from an identity
    ///
    /// Denied requests consume no budget: the probe's provisional
    /// timestamp is rolled back before the decision is returned.
    pub async fn admit(&self, identity: &str) -> Decision {
        self.admit_at(identity, epoch_ms()).await
    }

    pub(crate) async fn admit_at(&self, identity: &str, now_ms: u64) -> Decision {
        match &self.store {
            Store::Memory(memory) => Self::admit_memory(memory, self.caps, identity, now_ms),
            Store::Redis {
                redis,
                fallback,
                last_warned,
            } => {
                let member = format!("{now_ms}-{}", self.sequence.fetch_add(1, Ordering::Relaxed));
                match redis.record(identity, now_ms, &member).await {
                    Ok(probe) => {
                        let decision = decide(self.caps, probe, now_ms);
                        if !decision.allowed
                            && let Err(e) = redis.rollback(identity, &member).await
                        {
                            tracing::warn!(error = %e, "failed to roll back denied probe");
                        }
                        decision
                    }
                    Err(e) => {
                        self.warn_degraded(last_warned, &e, now_ms);
                        Self::admit_memory(fallback, self.caps, identity, now_ms)
                    }
                }
            }
        }
    }

    fn admit_memory(store: &MemoryStore, caps: WindowCaps, identity: &str, now_ms: u64) -> Decision {
        let probe = store.record(identity, now_ms);
        let decision = decide(caps, probe, now_ms);
        if !decision.allowed {
            store.rollback(identity, now_ms);
        }
        decision
    }

    /// Log the Redis degradation at most once per failure window
    fn warn_degraded(&self, last_warned: &AtomicU64, error: &RateLimitError, now_ms: u64) {
        let now_secs = now_ms / 1000;
        let previous = last_warned.load(Ordering::Relaxed);
        if now_secs.saturating_sub(previous) >= DEGRADED_LOG_INTERVAL_SECS
            && last_warned
                .compare_exchange(previous, now_secs, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            tracing::warn!(
                error = %error,
                "Redis rate-limit store unreachable, degrading to in-memory store"
            );
        }
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, per_hour: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enabled: true,
            per_minute,
            per_hour,
            redis_url: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn admits_until_the_minute_cap() {
        let limiter = limiter(2, 1000);

        let first = limiter.admit_at("t1", 0).await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.admit_at("t1", 5_000).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.admit_at("t1", 10_000).await;
        assert!(!third.allowed);
        assert_eq!(third.retry_after, Some(50));
    }

    #[tokio::test]
    async fn window_slides_so_budget_returns() {
        let limiter = limiter(2, 1000);

        limiter.admit_at("t1", 0).await;
        limiter.admit_at("t1", 5_000).await;
        assert!(!limiter.admit_at("t1", 10_000).await.allowed);

        // 60 s after the first request its slot frees up; the denied
        // probe must not have consumed budget
        assert!(limiter.admit_at("t1", 60_001).await.allowed);
    }

    #[tokio::test]
    async fn hour_cap_binds_independently() {
        let limiter = limiter(1000, 3);

        for i in 0..3u64 {
            assert!(limiter.admit_at("t1", i * 1_000).await.allowed);
        }

        let denied = limiter.admit_at("t1", 10_000).await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit, 3);
        // Hour window: oldest at t=0, so the wait is just under an hour
        assert_eq!(denied.retry_after, Some(3590));
    }

    #[tokio::test]
    async fn identities_do_not_share_budget() {
        let limiter = limiter(1, 1000);

        assert!(limiter.admit_at("t1", 0).await.allowed);
        assert!(!limiter.admit_at("t1", 1_000).await.allowed);
        assert!(limiter.admit_at("t2", 1_000).await.allowed);
    }

    #[tokio::test]
    async fn minute_cap_never_exceeded_in_any_sliding_window() {
        let limiter = limiter(5, 1000);
        let mut admitted: Vec<u64> = Vec::new();

        // One request every 7 seconds for 5 minutes
        for i in 0..43u64 {
            let now = i * 7_000;
            if limiter.admit_at("t1", now).await.allowed {
                admitted.push(now);
            }
        }

        for &start in &admitted {
            let in_window = admitted
                .iter()
                .filter(|&&ts| ts >= start && ts < start + 60_000)
                .count();
            assert!(in_window <= 5, "sliding window starting at {start} holds {in_window}");
        }
    }
}
