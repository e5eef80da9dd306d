use crate::env::{env_bool, env_opt, env_u32};

/// Rate limiter configuration
///
/// Limits are per identity across two concurrent sliding windows. When a
/// Redis URL is configured the limiter is cluster-wide; otherwise it is
/// per-node in memory.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether admission control is active
    pub enabled: bool,
    /// Cap for the 60 second window
    pub per_minute: u32,
    /// Cap for the 3600 second window
    pub per_hour: u32,
    /// Redis URL enabling the cluster-wide store
    pub redis_url: Option<String>,
}

impl RateLimitConfig {
    /// Read rate limiter configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns an error when a cap is zero while limiting is enabled.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            enabled: env_bool("RATE_LIMIT_ENABLED", true),
            per_minute: env_u32("RATE_LIMIT_PER_MINUTE", 60),
            per_hour: env_u32("RATE_LIMIT_PER_HOUR", 1000),
            redis_url: env_opt("RATE_LIMIT_REDIS_URL"),
        };

        if config.enabled && (config.per_minute == 0 || config.per_hour == 0) {
            anyhow::bail!("rate limit caps must be greater than zero");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_caps() {
        temp_env::with_vars(
            [
                ("RATE_LIMIT_ENABLED", None::<&str>),
                ("RATE_LIMIT_PER_MINUTE", None),
                ("RATE_LIMIT_PER_HOUR", None),
                ("RATE_LIMIT_REDIS_URL", None),
            ],
            || {
                let config = RateLimitConfig::from_env().unwrap();
                assert!(config.enabled);
                assert_eq!(config.per_minute, 60);
                assert_eq!(config.per_hour, 1000);
                assert!(config.redis_url.is_none());
            },
        );
    }

    #[test]
    fn zero_cap_is_rejected() {
        temp_env::with_vars(
            [
                ("RATE_LIMIT_ENABLED", Some("true")),
                ("RATE_LIMIT_PER_MINUTE", Some("0")),
            ],
            || {
                assert!(RateLimitConfig::from_env().is_err());
            },
        );
    }
}
