//! Provider trait and the seven back-end adapters
//!
//! Adapters are stateless aside from an HTTP/SDK client and
//! configuration. They perform no retries (fallback is the gateway's
//! job) and return canonical errors only. A missing credential is
//! detected before any network round-trip.

pub mod anthropic;
pub mod azure_openai;
pub mod bedrock;
pub mod gemini;
pub mod groq;
pub mod lightllm;
pub mod ollama;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use relay_config::GenerationParams;
use serde::Serialize;

use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiStreamChunk, OpenAiStreamState};
use crate::types::{ChatMessage, GenerationResponse, StreamChunk};

/// Stream of canonical chunks produced by one adapter call
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>;

/// Fully resolved inputs for one adapter call
///
/// The gateway resolves model and parameters before the adapter sees the
/// request, so adapters never consult the registry.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Model (or deployment) identifier on this provider
    pub model: String,
    /// Validated conversation
    pub messages: Vec<ChatMessage>,
    /// Effective generation parameters
    pub params: GenerationParams,
}

/// Static description of an adapter, surfaced by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescription {
    /// Provider identifier
    pub name: String,
    /// Model used when tier resolution yields nothing more specific
    pub default_model: String,
    /// Models the adapter knows about
    pub models: Vec<String>,
}

/// Contract implemented by each back-end adapter
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier
    fn name(&self) -> &'static str;

    /// Default model for this provider
    fn default_model(&self) -> String;

    /// Models the adapter knows about
    fn available_models(&self) -> Vec<String> {
        vec![self.default_model()]
    }

    /// Static description for the health surface
    fn describe(&self) -> ProviderDescription {
        ProviderDescription {
            name: self.name().to_owned(),
            default_model: self.default_model(),
            models: self.available_models(),
        }
    }

    /// One non-streaming generation call
    async fn generate(&self, request: &ProviderRequest) -> Result<GenerationResponse, GatewayError>;

    /// One streaming generation call
    async fn generate_stream(&self, request: &ProviderRequest) -> Result<ChunkStream, GatewayError>;

    /// Cheap availability probe
    ///
    /// Must not mutate circuit-breaker state; the health surface calls
    /// this in parallel for every enabled provider.
    async fn is_available(&self) -> bool;
}

/// Translate a transport-level reqwest failure
pub(crate) fn classify_transport_error(provider: &str, err: &reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout {
            provider: provider.to_owned(),
        }
    } else {
        GatewayError::Network {
            provider: provider.to_owned(),
            message: err.to_string(),
        }
    }
}

/// Translate a non-success HTTP response into the canonical taxonomy
///
/// Consumes the response body for the error detail, so callers should
/// invoke this only after checking `status().is_success()`.
pub(crate) async fn classify_http_response(
    provider: &str,
    model: &str,
    response: reqwest::Response,
) -> GatewayError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let body = response.text().await.unwrap_or_default();

    tracing::warn!(provider, %status, "upstream returned error");

    match status.as_u16() {
        401 | 403 => GatewayError::Auth {
            provider: provider.to_owned(),
        },
        404 => GatewayError::ModelNotFound {
            provider: provider.to_owned(),
            model: model.to_owned(),
        },
        408 => GatewayError::Timeout {
            provider: provider.to_owned(),
        },
        429 => GatewayError::RateLimited {
            provider: provider.to_owned(),
            retry_after,
        },
        400 | 422 => GatewayError::InvalidRequest(format!("{provider} rejected the request: {body}")),
        _ => GatewayError::Unavailable {
            provider: provider.to_owned(),
            message: format!("provider returned {status}: {body}"),
        },
    }
}

/// Map an OpenAI-dialect SSE response body onto the canonical stream
///
/// Shared by every adapter speaking the chat-completions dialect.
pub(crate) fn openai_sse_stream(provider: &'static str, response: reqwest::Response) -> ChunkStream {
    use eventsource_stream::Eventsource;

    let event_stream = response.bytes_stream().eventsource();
    let mut state = OpenAiStreamState::default();

    let mapped = event_stream
        .map(move |result| -> Vec<Result<StreamChunk, GatewayError>> {
            match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        Vec::new()
                    } else if data == "[DONE]" {
                        vec![Ok(state.finish())]
                    } else {
                        match serde_json::from_str::<OpenAiStreamChunk>(data) {
                            Ok(chunk) => state.absorb(&chunk).into_iter().map(Ok).collect(),
                            Err(e) => {
                                tracing::debug!(provider, error = %e, "skipping unparseable SSE chunk");
                                Vec::new()
                            }
                        }
                    }
                }
                Err(e) => vec![Err(GatewayError::Network {
                    provider: provider.to_owned(),
                    message: e.to_string(),
                })],
            }
        })
        .flat_map(futures_util::stream::iter);

    Box::pin(mapped)
}
