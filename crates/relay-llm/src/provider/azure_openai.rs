//! Azure OpenAI adapter
//!
//! Same chat-completions dialect, different addressing: requests go to
//! `{endpoint}/openai/deployments/{deployment}/chat/completions` with an
//! `api-version` query parameter and an `api-key` header. The model
//! string resolved by the registry is the deployment name.

use async_trait::async_trait;
use relay_config::{ModelRegistry, ProviderId};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ChunkStream, Provider, ProviderRequest, classify_http_response, classify_transport_error, openai_sse_stream};
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiResponse, build_request, into_response};
use crate::types::GenerationResponse;

/// API version sent when the registry does not pin one
const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Azure OpenAI adapter
pub struct AzureOpenaiProvider {
    client: Client,
    endpoint: Option<Url>,
    api_key: Option<SecretString>,
    api_version: String,
    default_model: String,
    models: Vec<String>,
}

impl AzureOpenaiProvider {
    /// Build from the loaded registry
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let id = ProviderId::AzureOpenai;
        let entry = registry.provider(id);

        Self {
            client: Client::new(),
            endpoint: registry.base_url(id),
            api_key: registry.credential(id),
            api_version: entry
                .and_then(|e| e.api_version.clone())
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_owned()),
            default_model: registry
                .model_for(id, relay_config::ModelTier::Default)
                .unwrap_or_else(|_| "gpt-4o".to_owned()),
            models: entry.map(|e| e.models.values().cloned().collect()).unwrap_or_default(),
        }
    }

    /// Endpoint and credential, or an immediate auth error
    fn require_config(&self) -> Result<(&Url, &SecretString), GatewayError> {
        match (self.endpoint.as_ref(), self.api_key.as_ref()) {
            (Some(endpoint), Some(key)) => Ok((endpoint, key)),
            _ => Err(GatewayError::Auth {
                provider: self.name().to_owned(),
            }),
        }
    }

    fn chat_url(&self, endpoint: &Url, deployment: &str) -> String {
        let base = endpoint.as_str().trim_end_matches('/');
        format!(
            "{base}/openai/deployments/{deployment}/chat/completions?api-version={}",
            self.api_version
        )
    }
}

#[async_trait]
impl Provider for AzureOpenaiProvider {
    fn name(&self) -> &'static str {
        "azure_openai"
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
        let (endpoint, key) = self.require_config()?;
        let api_key = key.expose_secret().to_owned();
        let wire_request = build_request(&request.model, &request.messages, &request.params, false);

        let response = self
            .client
            .post(self.chat_url(endpoint, &request.model))
            .header("api-key", api_key)
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
        let (endpoint, key) = self.require_config()?;
        let api_key = key.expose_secret().to_owned();
        let wire_request = build_request(&request.model, &request.messages, &request.params, true);

        let response = self
            .client
            .post(self.chat_url(endpoint, &request.model))
            .header("api-key", api_key)
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
        self.endpoint.is_some() && self.api_key.is_some()
    }
}
