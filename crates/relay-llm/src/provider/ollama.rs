//! Ollama adapter (local runtime)
//!
//! No credential; the runtime is addressed directly. Responses stream as
//! newline-delimited JSON rather than SSE.

use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use relay_config::{ModelRegistry, ProviderId};
use reqwest::Client;
use url::Url;

use super::{ChunkStream, Provider, ProviderRequest, classify_http_response, classify_transport_error};
use crate::error::GatewayError;
use crate::protocol::ollama::{OllamaChatResponse, OllamaTagsResponse, build_request, chunk_into, into_response};
use crate::types::{GenerationResponse, StreamChunk};

/// Default base URL for a local runtime
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local Ollama adapter
pub struct OllamaProvider {
    client: Client,
    base_url: Url,
    default_model: String,
    registry_models: Vec<String>,
    /// Models reported by the runtime, refreshed by availability probes
    cached_models: RwLock<Option<Vec<String>>>,
}

impl OllamaProvider {
    /// Build from the loaded registry
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (cannot happen).
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let id = ProviderId::Ollama;
        Self {
            client: Client::new(),
            base_url: registry
                .base_url(id)
                .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL")),
            default_model: registry
                .model_for(id, relay_config::ModelTier::Default)
                .unwrap_or_else(|_| "llama3.2".to_owned()),
            registry_models: registry
                .provider(id)
                .map(|entry| entry.models.values().cloned().collect())
                .unwrap_or_default(),
            cached_models: RwLock::new(None),
        }
    }

    fn chat_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/api/chat")
    }

    fn tags_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/api/tags")
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn available_models(&self) -> Vec<String> {
        if let Ok(cached) = self.cached_models.read()
            && let Some(ref models) = *cached
        {
            return models.clone();
        }
        if self.registry_models.is_empty() {
            vec![self.default_model()]
        } else {
            self.registry_models.clone()
        }
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<GenerationResponse, GatewayError> {
        let wire_request = build_request(&request.model, &request.messages, &request.params, false);

        let response = self
            .client
            .post(self.chat_url())
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

        let wire_response: OllamaChatResponse = response.json().await.map_err(|e| GatewayError::Unavailable {
            provider: self.name().to_owned(),
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(into_response(&wire_response, &request.model, self.name()))
    }

    async fn generate_stream(&self, request: &ProviderRequest) -> Result<ChunkStream, GatewayError> {
        let wire_request = build_request(&request.model, &request.messages, &request.params, true);

        let response = self
            .client
            .post(self.chat_url())
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
        let mapped = ndjson_lines(Box::pin(response.bytes_stream()))
            .map(move |result| -> Vec<Result<StreamChunk, GatewayError>> {
                match result {
                    Ok(line) => match serde_json::from_str::<OllamaChatResponse>(&line) {
                        Ok(frame) => chunk_into(&frame).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(provider, error = %e, "skipping unparseable NDJSON line");
                            Vec::new()
                        }
                    },
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
        let response = self
            .client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => {
                // Refresh the model cache while we have the listing
                if let Ok(tags) = r.json::<OllamaTagsResponse>().await
                    && let Ok(mut cached) = self.cached_models.write()
                {
                    *cached = Some(tags.models.into_iter().map(|m| m.name).collect());
                }
                true
            }
            _ => false,
        }
    }
}

/// Split a byte stream into trimmed, non-empty NDJSON lines
fn ndjson_lines<S>(stream: S) -> impl futures_util::Stream<Item = Result<String, reqwest::Error>>
where
    S: futures_util::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
{
    futures_util::stream::unfold(
        (stream, Vec::new(), VecDeque::new(), false),
        |(mut stream, mut buffer, mut pending, mut ended)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (stream, buffer, pending, ended)));
                }
                if ended {
                    if buffer.is_empty() {
                        return None;
                    }
                    let line = String::from_utf8_lossy(&buffer).trim().to_owned();
                    buffer.clear();
                    if line.is_empty() {
                        return None;
                    }
                    return Some((Ok(line), (stream, buffer, pending, ended)));
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend_from_slice(&bytes);
                        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                            let raw: Vec<u8> = buffer.drain(..=pos).collect();
                            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]).trim().to_owned();
                            if !line.is_empty() {
                                pending.push_back(line);
                            }
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, pending, ended))),
                    None => ended = true,
                }
            }
        },
    )
}
