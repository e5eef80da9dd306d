//! Groq adapter (OpenAI-compatible dialect)

use async_trait::async_trait;
use relay_config::{ModelRegistry, ProviderId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChunkStream, Provider, ProviderRequest, classify_http_response, classify_transport_error, openai_sse_stream};
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiResponse, build_request, into_response};
use crate::types::GenerationResponse;

/// Groq's OpenAI-compatible endpoint root
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq cloud adapter
pub struct GroqProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
    models: Vec<String>,
}

impl GroqProvider {
    /// Build from the loaded registry
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (cannot happen).
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let id = ProviderId::Groq;
        Self {
            client: Client::new(),
            base_url: registry
                .base_url(id)
                .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL")),
            api_key: registry.credential(id),
            default_model: registry
                .model_for(id, relay_config::ModelTier::Default)
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_owned()),
            models: registry
                .provider(id)
                .map(|entry| entry.models.values().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn require_key(&self) -> Result<&SecretString, GatewayError> {
        self.api_key.as_ref().ok_or_else(|| GatewayError::Auth {
            provider: self.name().to_owned(),
        })
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl Provider for GroqProvider {
    fn name(&self) -> &'static str {
        "groq"
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
            .post(self.completions_url())
            .bearer_auth(api_key)
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
        let api_key = self.require_key()?.expose_secret().to_owned();
        let wire_request = build_request(&request.model, &request.messages, &request.params, true);

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
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
        self.api_key.is_some()
    }
}
