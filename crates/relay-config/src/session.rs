use crate::env::{env_string, env_u64};

/// Storage back end for session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    /// Per-process map, suitable for development and tests
    Memory,
    /// Redis with native TTL, suitable for multi-node deployments
    Redis,
}

/// Session store configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Selected back end
    pub backend: SessionBackend,
    /// Redis connection URL (used when backend is Redis)
    pub redis_url: String,
    /// Default time-to-live for saved sessions, in seconds
    pub ttl_seconds: u64,
    /// Keyspace prefix for Redis keys
    pub prefix: String,
    /// Upper bound on in-memory entries; oldest-expiring are evicted
    pub max_entries: usize,
}

impl SessionConfig {
    /// Read session store configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns an error for an unrecognized `SESSION_STORE` value.
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match env_string("SESSION_STORE", "memory").to_ascii_lowercase().as_str() {
            "memory" => SessionBackend::Memory,
            "redis" => SessionBackend::Redis,
            other => anyhow::bail!("unknown SESSION_STORE value: {other}"),
        };

        Ok(Self {
            backend,
            redis_url: env_string("SESSION_REDIS_URL", "redis://localhost:6379"),
            ttl_seconds: env_u64("SESSION_TTL", 3600),
            prefix: env_string("SESSION_PREFIX", "relay:session:"),
            max_entries: usize::try_from(env_u64("SESSION_MAX_ENTRIES", 10_000)).unwrap_or(10_000),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_the_default_backend() {
        temp_env::with_vars([("SESSION_STORE", None::<&str>), ("SESSION_TTL", None)], || {
            let config = SessionConfig::from_env().unwrap();
            assert_eq!(config.backend, SessionBackend::Memory);
            assert_eq!(config.ttl_seconds, 3600);
            assert_eq!(config.prefix, "relay:session:");
        });
    }

    #[test]
    fn unknown_backend_is_rejected() {
        temp_env::with_var("SESSION_STORE", Some("dynamo"), || {
            assert!(SessionConfig::from_env().is_err());
        });
    }
}
