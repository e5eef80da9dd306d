use std::path::PathBuf;

use clap::Parser;

/// Relay LLM gateway
#[derive(Debug, Parser)]
#[command(name = "relay", about = "Provider-agnostic LLM gateway with typed fallback")]
pub struct Args {
    /// Path to the model registry file
    #[arg(short, long, default_value = "config/model-registry.yaml", env = "RELAY_REGISTRY")]
    pub registry: PathBuf,

    /// Override the listen address
    #[arg(long, env = "RELAY_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,
}
