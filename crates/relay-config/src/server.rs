use std::net::SocketAddr;

use crate::env::env_opt;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address; defaults to 0.0.0.0:8000
    pub listen: SocketAddr,
}

impl ServerConfig {
    /// Read server configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns an error when `RELAY_LISTEN` is not a valid socket address.
    pub fn from_env() -> anyhow::Result<Self> {
        let listen = match env_opt("RELAY_LISTEN") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid RELAY_LISTEN address '{raw}': {e}"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8000)),
        };

        Ok(Self { listen })
    }
}
