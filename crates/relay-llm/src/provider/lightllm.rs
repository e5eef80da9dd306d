//! LightLLM adapter (self-hosted OpenAI-compatible runtime)
//!
//! LightLLM deployments speak the chat-completions dialect at a
//! configurable base URL. A credential is optional; secured deployments
//! take a bearer token.

use async_trait::async_trait;
use relay_config::{ModelRegistry, ProviderId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChunkStream, Provider, ProviderRequest, classify_http_response, classify_transport_error, openai_sse_stream};
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiResponse, build_request, into_response};
use crate::types::GenerationResponse;

/// Default base URL for a local deployment
const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

/// Self-hosted LightLLM adapter
pub struct LightllmProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
    models: Vec<String>,
}

impl LightllmProvider {
    /// Build from the loaded registry
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (cannot happen).
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let id = ProviderId::Lightllm;
        Self {
            client: Client::new(),
            base_url: registry
                .base_url(id)
                .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL")),
            api_key: registry.credential(id),
            default_model: registry
                .model_for(id, relay_config::ModelTier::Default)
                .unwrap_or_else(|_| "llama-3.1-8b-instruct".to_owned()),
            models: registry
                .provider(id)
                .map(|entry| entry.models.values().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Attach the bearer token when one is configured
    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_ref() {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Provider for LightllmProvider {
    fn name(&self) -> &'static str {
        "lightllm"
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
        let wire_request = build_request(&request.model, &request.messages, &request.params, false);

        let response = self
            .authorize(self.client.post(self.completions_url()))
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

        let wire_response: OpenAiResponse = response.json().await.map_err(|e| GatewayError::Unavailable {
            provider: self.name().to_owned(),
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(into_response(wire_response, &request.model, self.name()))
    }

    async fn generate_stream(&self, request: &ProviderRequest) -> Result<ChunkStream, GatewayError> {
        let wire_request = build_request(&request.model, &request.messages, &request.params, true);

        let response = self
            .authorize(self.client.post(self.completions_url()))
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

        Ok(openai_sse_stream(self.name(), response))
    }

    async fn is_available(&self) -> bool {
        // Runtime health endpoint lives next to the /v1 dialect root
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = format!("{}/health", base.trim_end_matches("/v1"));

        self.client
            .get(url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
