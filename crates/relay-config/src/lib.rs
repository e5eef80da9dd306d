#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Configuration for the relay gateway
//!
//! Two sources feed the gateway: a YAML model registry (providers, tiers,
//! fallback chain, agent assignments) loaded explicitly at startup, and
//! environment variables for everything operational (rate limits, session
//! store, auth). The registry is immutable after load; reload means
//! loading a fresh value.

mod auth;
mod env;
mod rate_limit;
mod registry;
mod server;
mod session;

pub use auth::{AuthConfig, JwtAlgorithm};
pub use rate_limit::RateLimitConfig;
pub use registry::{
    GenerationParams, ModelRegistry, ModelTier, ProviderEntry, ProviderId, ResolveError,
};
pub use server::ServerConfig;
pub use session::{SessionBackend, SessionConfig};

/// Operational configuration assembled from the environment
#[derive(Debug)]
pub struct GatewayConfig {
    /// HTTP server settings
    pub server: ServerConfig,
    /// Auth middleware settings
    pub auth: AuthConfig,
    /// Rate limiter settings
    pub rate_limit: RateLimitConfig,
    /// Session store settings
    pub session: SessionConfig,
}

impl GatewayConfig {
    /// Read the full operational configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is unusable, notably when
    /// auth is enabled without a signing secret.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            session: SessionConfig::from_env()?,
        })
    }
}
