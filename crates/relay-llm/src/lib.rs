#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! Provider-agnostic LLM gateway
//!
//! One `generate`/`generate_stream` contract fronting seven inference
//! back ends, with health-aware provider selection, typed fallback, and
//! a single canonical streaming chunk format.

mod error;
mod gateway;
mod health;
mod probe;
pub mod protocol;
pub mod provider;
pub mod types;

pub use error::GatewayError;
pub use gateway::Gateway;
pub use health::{CircuitBreakerConfig, CircuitState, HealthSnapshot, HealthTracker};
pub use probe::{HealthReport, ProviderStatus};
