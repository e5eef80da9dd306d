//! Anthropic Messages API adapter

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use relay_config::{ModelRegistry, ProviderId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChunkStream, Provider, ProviderRequest, classify_http_response, classify_transport_error};
use crate::error::GatewayError;
use crate::protocol::anthropic::{AnthropicResponse, AnthropicStreamEvent, AnthropicStreamState, build_request, into_response};
use crate::types::{GenerationResponse, StreamChunk};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API adapter
pub struct AnthropicProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
    models: Vec<String>,
}

impl AnthropicProvider {
    /// Build from the loaded registry
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (cannot happen).
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let id = ProviderId::Anthropic;
        let base_url = registry
            .base_url(id)
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));
        let models = registry
            .provider(id)
            .map(|entry| entry.models.values().cloned().collect())
            .unwrap_or_default();

        Self {
            client: Client::new(),
            base_url,
            api_key: registry.credential(id),
            default_model: registry
                .model_for(id, relay_config::ModelTier::Default)
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_owned()),
            models,
        }
    }

    /// Credential or an immediate auth error, no network involved
    fn require_key(&self) -> Result<&SecretString, GatewayError> {
        self.api_key.as_ref().ok_or_else(|| GatewayError::Auth {
            provider: self.name().to_owned(),
        })
    }

    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn available_models(&self) -> Vec<String> {
        if self.models.is_empty() {
            vec![self.default_model()]
        } else {
            self.models.clone()
        }
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<GenerationResponse, GatewayError> {
        let api_key = self.require_key()?.expose_secret().to_owned();
        let wire_request = build_request(&request.model, &request.messages, &request.params, false);

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = self.name(), error = %e, "upstream request failed");
                classify_transport_error(self.name(), &e)
            })?;

        if !response.status().is_success() {
            return Err(classify_http_response(self.name(), &request.model, response).await);
        }

        let wire_response: AnthropicResponse = response.json().await.map_err(|e| GatewayError::Unavailable {
            provider: self.name().to_owned(),
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(into_response(wire_response, &request.model, self.name()))
    }

    async fn generate_stream(&self, request: &ProviderRequest) -> Result<ChunkStream, GatewayError> {
        let api_key = self.require_key()?.expose_secret().to_owned();
        let wire_request = build_request(&request.model, &request.messages, &request.params, true);

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = self.name(), error = %e, "upstream stream request failed");
                classify_transport_error(self.name(), &e)
            })?;

        if !response.status().is_success() {
            return Err(classify_http_response(self.name(), &request.model, response).await);
        }

        let provider = self.name();
        let event_stream = response.bytes_stream().eventsource();
        let mut state = AnthropicStreamState::default();

        let mapped = event_stream
            .map(move |result| -> Vec<Result<StreamChunk, GatewayError>> {
                match result {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            Vec::new()
                        } else {
                            match serde_json::from_str::<AnthropicStreamEvent>(data) {
                                Ok(stream_event) => state.absorb(&stream_event).into_iter().map(Ok).collect(),
                                Err(e) => {
                                    tracing::debug!(provider, error = %e, "skipping unparseable SSE event");
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

        Ok(Box::pin(mapped))
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
