//! AWS Bedrock adapter
//!
//! Uses `invoke_model` / `invoke_model_with_response_stream` with raw
//! JSON bodies; the payload shape is dispatched on the model identifier
//! prefix (Claude, Llama, Titan families).

use std::collections::VecDeque;

use async_trait::async_trait;
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::error::SdkError;
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::operation::invoke_model_with_response_stream::InvokeModelWithResponseStreamError;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::ResponseStream;
use relay_config::{ModelRegistry, ProviderId};

use super::{ChunkStream, Provider, ProviderRequest};
use crate::error::GatewayError;
use crate::protocol::bedrock::{BedrockStreamState, build_body, parse_response};
use crate::types::GenerationResponse;

/// AWS Bedrock adapter
pub struct BedrockProvider {
    client: BedrockClient,
    has_credentials: bool,
    default_model: String,
    models: Vec<String>,
}

impl BedrockProvider {
    /// Build from the loaded registry
    ///
    /// Region preference: registry entry, then `AWS_REGION`, then
    /// us-east-1. Credentials come from the default AWS chain.
    pub async fn from_registry(registry: &ModelRegistry) -> Self {
        let id = ProviderId::Bedrock;
        let entry = registry.provider(id);

        let region = entry
            .and_then(|e| e.region.clone())
            .or_else(|| std::env::var("AWS_REGION").ok())
            .unwrap_or_else(|| "us-east-1".to_owned());

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region))
            .load()
            .await;

        let has_credentials = match config.credentials_provider() {
            Some(provider) => provider.provide_credentials().await.is_ok(),
            None => false,
        };

        Self {
            client: BedrockClient::new(&config),
            has_credentials,
            default_model: registry
                .model_for(id, relay_config::ModelTier::Default)
                .unwrap_or_else(|_| "anthropic.claude-3-sonnet-20240229-v1:0".to_owned()),
            models: entry.map(|e| e.models.values().cloned().collect()).unwrap_or_default(),
        }
    }

    fn require_credentials(&self) -> Result<(), GatewayError> {
        if self.has_credentials {
            Ok(())
        } else {
            Err(GatewayError::Auth {
                provider: self.name().to_owned(),
            })
        }
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &'static str {
        "bedrock"
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
        self.require_credentials()?;
        let body = build_body(&request.model, &request.messages, &request.params)?;

        let output = self
            .client
            .invoke_model()
            .model_id(&request.model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = self.name(), error = %e, "bedrock invoke failed");
                classify_invoke_error(self.name(), &request.model, &e)
            })?;

        parse_response(&request.model, output.body().as_ref(), self.name())
    }

    async fn generate_stream(&self, request: &ProviderRequest) -> Result<ChunkStream, GatewayError> {
        self.require_credentials()?;
        let body = build_body(&request.model, &request.messages, &request.params)?;
        let state = BedrockStreamState::for_model(&request.model)?;

        let output = self
            .client
            .invoke_model_with_response_stream()
            .model_id(&request.model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(provider = self.name(), error = %e, "bedrock invoke stream failed");
                classify_stream_error(self.name(), &request.model, &e)
            })?;

        let provider = self.name();
        let receiver = output.body;

        // Convert the SDK's EventReceiver into a canonical chunk stream
        let stream = futures_util::stream::unfold(
            (receiver, state, VecDeque::new()),
            move |(mut receiver, mut state, mut pending)| async move {
                loop {
                    if let Some(chunk) = pending.pop_front() {
                        return Some((Ok(chunk), (receiver, state, pending)));
                    }

                    match receiver.recv().await {
                        Ok(Some(ResponseStream::Chunk(part))) => {
                            if let Some(blob) = part.bytes() {
                                pending.extend(state.absorb(blob.as_ref()));
                            }
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => return None,
                        Err(e) => {
                            let err = GatewayError::Network {
                                provider: provider.to_owned(),
                                message: e.to_string(),
                            };
                            return Some((Err(err), (receiver, state, pending)));
                        }
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }

    async fn is_available(&self) -> bool {
        self.has_credentials
    }
}

fn classify_invoke_error(provider: &str, model: &str, err: &SdkError<InvokeModelError>) -> GatewayError {
    match err {
        SdkError::ServiceError(ctx) => {
            let service_err = ctx.err();
            if service_err.is_throttling_exception() || service_err.is_service_quota_exceeded_exception() {
                GatewayError::RateLimited {
                    provider: provider.to_owned(),
                    retry_after: None,
                }
            } else if service_err.is_access_denied_exception() {
                GatewayError::Auth {
                    provider: provider.to_owned(),
                }
            } else if service_err.is_resource_not_found_exception() {
                GatewayError::ModelNotFound {
                    provider: provider.to_owned(),
                    model: model.to_owned(),
                }
            } else if service_err.is_validation_exception() {
                GatewayError::InvalidRequest(format!("bedrock rejected the request: {service_err}"))
            } else if service_err.is_model_timeout_exception() {
                GatewayError::Timeout {
                    provider: provider.to_owned(),
                }
            } else {
                GatewayError::Unavailable {
                    provider: provider.to_owned(),
                    message: service_err.to_string(),
                }
            }
        }
        SdkError::TimeoutError(_) => GatewayError::Timeout {
            provider: provider.to_owned(),
        },
        SdkError::DispatchFailure(_) => GatewayError::Network {
            provider: provider.to_owned(),
            message: err.to_string(),
        },
        other => GatewayError::Unavailable {
            provider: provider.to_owned(),
            message: other.to_string(),
        },
    }
}

fn classify_stream_error(
    provider: &str,
    model: &str,
    err: &SdkError<InvokeModelWithResponseStreamError>,
) -> GatewayError {
    match err {
        SdkError::ServiceError(ctx) => {
            let service_err = ctx.err();
            if service_err.is_throttling_exception() || service_err.is_service_quota_exceeded_exception() {
                GatewayError::RateLimited {
                    provider: provider.to_owned(),
                    retry_after: None,
                }
            } else if service_err.is_access_denied_exception() {
                GatewayError::Auth {
                    provider: provider.to_owned(),
                }
            } else if service_err.is_resource_not_found_exception() {
                GatewayError::ModelNotFound {
                    provider: provider.to_owned(),
                    model: model.to_owned(),
                }
            } else if service_err.is_validation_exception() {
                GatewayError::InvalidRequest(format!("bedrock rejected the request: {service_err}"))
            } else if service_err.is_model_timeout_exception() {
                GatewayError::Timeout {
                    provider: provider.to_owned(),
                }
            } else {
                GatewayError::Unavailable {
                    provider: provider.to_owned(),
                    message: service_err.to_string(),
                }
            }
        }
        SdkError::TimeoutError(_) => GatewayError::Timeout {
            provider: provider.to_owned(),
        },
        SdkError::DispatchFailure(_) => GatewayError::Network {
            provider: provider.to_owned(),
            message: err.to_string(),
        },
        other => GatewayError::Unavailable {
            provider: provider.to_owned(),
            message: other.to_string(),
        },
    }
}
