use std::str::FromStr;

use secrecy::SecretString;

use crate::env::{env_bool, env_opt, env_string};

/// Paths excluded from authentication when `AUTH_EXCLUDE_PATHS` is unset
const DEFAULT_EXCLUDE_PATHS: &str = "/health,/live,/ready";

/// JWT signing algorithm for bearer-token validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JwtAlgorithm {
    /// HMAC-SHA256
    Hs256,
    /// HMAC-SHA384
    Hs384,
    /// HMAC-SHA512
    Hs512,
}

impl FromStr for JwtAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            "HS384" => Ok(Self::Hs384),
            "HS512" => Ok(Self::Hs512),
            other => anyhow::bail!("unsupported JWT algorithm: {other}"),
        }
    }
}

/// Auth middleware configuration
#[derive(Debug)]
pub struct AuthConfig {
    /// Whether bearer-token authentication is enforced
    pub enabled: bool,
    /// Shared secret for signature verification; required when enabled
    pub jwt_secret: Option<SecretString>,
    /// Signing algorithm tokens must use
    pub jwt_algorithm: JwtAlgorithm,
    /// Paths served without authentication
    pub exclude_paths: Vec<String>,
}

impl AuthConfig {
    /// Read auth configuration from the environment
    ///
    /// # Errors
    ///
    /// Enabling auth without `JWT_SECRET` is a fatal startup error, as is
    /// an unrecognized `JWT_ALGORITHM`.
    pub fn from_env() -> anyhow::Result<Self> {
        let enabled = env_bool("AUTH_ENABLED", false);
        let jwt_secret = env_opt("JWT_SECRET").map(SecretString::from);
        let jwt_algorithm = env_string("JWT_ALGORITHM", "HS256").parse()?;

        if enabled && jwt_secret.is_none() {
            anyhow::bail!("JWT_SECRET is required when AUTH_ENABLED=true");
        }

        let exclude_paths = env_string("AUTH_EXCLUDE_PATHS", DEFAULT_EXCLUDE_PATHS)
            .split(',')
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            enabled,
            jwt_secret,
            jwt_algorithm,
            exclude_paths,
        })
    }

    /// Whether the given request path is exempt from authentication
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_without_secret_is_fatal() {
        temp_env::with_vars(
            [("AUTH_ENABLED", Some("true")), ("JWT_SECRET", None)],
            || {
                assert!(AuthConfig::from_env().is_err());
            },
        );
    }

    #[test]
    fn disabled_without_secret_is_fine() {
        temp_env::with_vars(
            [("AUTH_ENABLED", Some("false")), ("JWT_SECRET", None)],
            || {
                let config = AuthConfig::from_env().unwrap();
                assert!(!config.enabled);
            },
        );
    }

    #[test]
    fn default_exclusions_cover_health_surface() {
        temp_env::with_vars(
            [
                ("AUTH_ENABLED", None::<&str>),
                ("AUTH_EXCLUDE_PATHS", None),
            ],
            || {
                let config = AuthConfig::from_env().unwrap();
                assert!(config.is_excluded("/health"));
                assert!(config.is_excluded("/ready"));
                assert!(config.is_excluded("/live"));
                assert!(!config.is_excluded("/chat"));
            },
        );
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        temp_env::with_var("JWT_ALGORITHM", Some("RS256"), || {
            assert!(AuthConfig::from_env().is_err());
        });
    }
}
