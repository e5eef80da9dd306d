//! AWS Bedrock `invoke_model` payload families
//!
//! Bedrock fronts several model families behind one invoke API; the JSON
//! body is keyed by the model identifier prefix. Claude models take
//! Messages-format JSON, Llama models take a single rendered prompt with
//! the family's special tokens, and Titan models take `inputText` with a
//! nested generation-config object.

use relay_config::GenerationParams;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::{ChatMessage, FinishReason, GenerationResponse, Role, StreamChunk, TokenUsage};

/// Model family behind a Bedrock model identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedrockFamily {
    /// `anthropic.*` — Messages-format JSON
    Claude,
    /// `meta.*` — prompt-in/text-out with Llama special tokens
    Llama,
    /// `amazon.titan*` — `inputText` + `textGenerationConfig`
    Titan,
}

impl BedrockFamily {
    /// Classify a model identifier by prefix
    pub fn of(model: &str) -> Result<Self, GatewayError> {
        if model.starts_with("anthropic.") {
            Ok(Self::Claude)
        } else if model.starts_with("meta.") {
            Ok(Self::Llama)
        } else if model.starts_with("amazon.titan") {
            Ok(Self::Titan)
        } else {
            Err(GatewayError::InvalidRequest(format!(
                "unsupported bedrock model family: {model}"
            )))
        }
    }
}

// -- Claude family --

/// Messages-format request body
#[derive(Debug, Clone, Serialize)]
pub struct ClaudeBody {
    /// Bedrock API version marker
    pub anthropic_version: &'static str,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Hoisted system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<ClaudeMessage>,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Role-tagged message
#[derive(Debug, Clone, Serialize)]
pub struct ClaudeMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Text content
    pub content: String,
}

/// Messages-format response body
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeResponseBody {
    /// Content blocks
    #[serde(default)]
    pub content: Vec<ClaudeContentBlock>,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<ClaudeUsage>,
}

/// Content block
#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeContentBlock {
    /// Block type ("text")
    #[serde(rename = "type", default)]
    pub block_type: String,
    /// Text payload
    #[serde(default)]
    pub text: String,
}

/// Usage block
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ClaudeUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Llama family --

/// Prompt-in request body
#[derive(Debug, Clone, Serialize)]
pub struct LlamaBody {
    /// Rendered prompt with special tokens
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_gen_len: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
}

/// Text-out response body; stream frames share this shape
#[derive(Debug, Clone, Deserialize)]
pub struct LlamaResponseBody {
    /// Generated text
    #[serde(default)]
    pub generation: String,
    /// Prompt token count
    #[serde(default)]
    pub prompt_token_count: Option<u32>,
    /// Generated token count
    #[serde(default)]
    pub generation_token_count: Option<u32>,
    /// Stop reason ("stop" or "length")
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Render a conversation into the Llama 3 prompt format
pub fn render_llama_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        match message.role {
            Role::System => {
                prompt.push_str("<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n");
                prompt.push_str(&message.content);
                prompt.push_str("<|eot_id|>");
            }
            Role::User => {
                prompt.push_str("<|start_header_id|>user<|end_header_id|>\n");
                prompt.push_str(&message.content);
                prompt.push_str("<|eot_id|>");
            }
            Role::Assistant => {
                prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n");
                prompt.push_str(&message.content);
                prompt.push_str("<|eot_id|>");
            }
        }
    }
    prompt.push_str("<|start_header_id|>assistant<|end_header_id|>\n");
    prompt
}

// -- Titan family --

/// `inputText` request body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanBody {
    /// Full rendered prompt
    pub input_text: String,
    /// Nested generation configuration
    pub text_generation_config: TitanGenerationConfig,
}

/// Titan generation configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanGenerationConfig {
    /// Maximum tokens to generate
    pub max_token_count: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Titan response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanResponseBody {
    /// Prompt token count
    #[serde(default)]
    pub input_text_token_count: Option<u32>,
    /// Generated results
    #[serde(default)]
    pub results: Vec<TitanResult>,
}

/// One Titan result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanResult {
    /// Generated text
    #[serde(default)]
    pub output_text: String,
    /// Generated token count
    #[serde(default)]
    pub token_count: Option<u32>,
    /// Completion reason ("FINISH", "LENGTH", "CONTENT_FILTERED")
    #[serde(default)]
    pub completion_reason: Option<String>,
}

/// Titan stream frame
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitanStreamFrame {
    /// Generated text fragment
    #[serde(default)]
    pub output_text: String,
    /// Completion reason, present on the final frame
    #[serde(default)]
    pub completion_reason: Option<String>,
    /// Prompt token count, present on the final frame
    #[serde(default)]
    pub input_text_token_count: Option<u32>,
    /// Total generated tokens, present on the final frame
    #[serde(default)]
    pub total_output_text_token_count: Option<u32>,
}

/// Render a conversation into Titan's plain-text prompt
pub fn render_titan_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    prompt.push_str("\n\nAssistant:");
    prompt
}

// -- Body construction and response parsing --

/// Serialize the request body for a model's family
pub fn build_body(
    model: &str,
    messages: &[ChatMessage],
    params: &GenerationParams,
) -> Result<Vec<u8>, GatewayError> {
    let body = match BedrockFamily::of(model)? {
        BedrockFamily::Claude => {
            let mut system = None;
            let mut conversation = Vec::new();
            for message in messages {
                match message.role {
                    Role::System => system = Some(message.content.clone()),
                    role => conversation.push(ClaudeMessage {
                        role: role.as_str().to_owned(),
                        content: message.content.clone(),
                    }),
                }
            }
            serde_json::to_vec(&ClaudeBody {
                anthropic_version: "bedrock-2023-05-31",
                max_tokens: params.max_tokens,
                system,
                messages: conversation,
                temperature: params.temperature,
                top_p: params.top_p,
                stop_sequences: (!params.stop_sequences.is_empty()).then(|| params.stop_sequences.clone()),
            })
        }
        BedrockFamily::Llama => serde_json::to_vec(&LlamaBody {
            prompt: render_llama_prompt(messages),
            max_gen_len: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
        }),
        BedrockFamily::Titan => serde_json::to_vec(&TitanBody {
            input_text: render_titan_prompt(messages),
            text_generation_config: TitanGenerationConfig {
                max_token_count: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                stop_sequences: (!params.stop_sequences.is_empty()).then(|| params.stop_sequences.clone()),
            },
        }),
    };

    body.map_err(|e| GatewayError::InvalidRequest(format!("failed to encode bedrock body: {e}")))
}

fn map_titan_reason(reason: &str) -> FinishReason {
    match reason {
        "LENGTH" => FinishReason::Length,
        "CONTENT_FILTERED" => FinishReason::Filter,
        _ => FinishReason::Stop,
    }
}

fn map_llama_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Parse a non-streaming response body for a model's family
pub fn parse_response(
    model: &str,
    bytes: &[u8],
    provider: &str,
) -> Result<GenerationResponse, GatewayError> {
    let parse_err =
        |e: serde_json::Error| GatewayError::Unavailable {
            provider: provider.to_owned(),
            message: format!("failed to parse bedrock response: {e}"),
        };

    match BedrockFamily::of(model)? {
        BedrockFamily::Claude => {
            let body: ClaudeResponseBody = serde_json::from_slice(bytes).map_err(parse_err)?;
            let content = body
                .content
                .iter()
                .filter(|b| b.block_type == "text")
                .map(|b| b.text.as_str())
                .collect();
            Ok(GenerationResponse {
                content,
                input_tokens: body.usage.map_or(0, |u| u.input_tokens),
                output_tokens: body.usage.map_or(0, |u| u.output_tokens),
                finish_reason: body
                    .stop_reason
                    .as_deref()
                    .map_or(FinishReason::Stop, super::anthropic::map_stop_reason),
                model: model.to_owned(),
                provider: provider.to_owned(),
            })
        }
        BedrockFamily::Llama => {
            let body: LlamaResponseBody = serde_json::from_slice(bytes).map_err(parse_err)?;
            Ok(GenerationResponse {
                content: body.generation,
                input_tokens: body.prompt_token_count.unwrap_or(0),
                output_tokens: body.generation_token_count.unwrap_or(0),
                finish_reason: body.stop_reason.as_deref().map_or(FinishReason::Stop, map_llama_reason),
                model: model.to_owned(),
                provider: provider.to_owned(),
            })
        }
        BedrockFamily::Titan => {
            let body: TitanResponseBody = serde_json::from_slice(bytes).map_err(parse_err)?;
            let result = body.results.first();
            Ok(GenerationResponse {
                content: result.map(|r| r.output_text.clone()).unwrap_or_default(),
                input_tokens: body.input_text_token_count.unwrap_or(0),
                output_tokens: result.and_then(|r| r.token_count).unwrap_or(0),
                finish_reason: result
                    .and_then(|r| r.completion_reason.as_deref())
                    .map_or(FinishReason::Stop, map_titan_reason),
                model: model.to_owned(),
                provider: provider.to_owned(),
            })
        }
    }
}

/// Stateful conversion of stream frame payloads into canonical chunks
#[derive(Debug)]
pub enum BedrockStreamState {
    /// Claude events reuse the Messages API stream state
    Claude(super::anthropic::AnthropicStreamState),
    /// Llama frames carry text plus a final stop reason
    Llama,
    /// Titan frames carry text plus a final completion reason
    Titan,
}

impl BedrockStreamState {
    /// Stream state for a model's family
    pub fn for_model(model: &str) -> Result<Self, GatewayError> {
        Ok(match BedrockFamily::of(model)? {
            BedrockFamily::Claude => Self::Claude(super::anthropic::AnthropicStreamState::default()),
            BedrockFamily::Llama => Self::Llama,
            BedrockFamily::Titan => Self::Titan,
        })
    }

    /// Absorb one frame payload, yielding canonical chunks
    ///
    /// Unparseable frames are skipped rather than failing the stream.
    pub fn absorb(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        match self {
            Self::Claude(state) => serde_json::from_slice::<super::anthropic::AnthropicStreamEvent>(bytes)
                .map(|event| state.absorb(&event))
                .unwrap_or_default(),
            Self::Llama => serde_json::from_slice::<LlamaResponseBody>(bytes)
                .map(|frame| {
                    let mut out = Vec::new();
                    if !frame.generation.is_empty() {
                        out.push(StreamChunk::delta(frame.generation.clone()));
                    }
                    if let Some(ref reason) = frame.stop_reason {
                        let usage = frame.prompt_token_count.map(|input| TokenUsage {
                            input_tokens: input,
                            output_tokens: frame.generation_token_count.unwrap_or(0),
                        });
                        out.push(StreamChunk::done(Some(map_llama_reason(reason)), usage));
                    }
                    out
                })
                .unwrap_or_default(),
            Self::Titan => serde_json::from_slice::<TitanStreamFrame>(bytes)
                .map(|frame| {
                    let mut out = Vec::new();
                    if !frame.output_text.is_empty() {
                        out.push(StreamChunk::delta(frame.output_text.clone()));
                    }
                    if let Some(ref reason) = frame.completion_reason {
                        let usage = frame.input_text_token_count.map(|input| TokenUsage {
                            input_tokens: input,
                            output_tokens: frame.total_output_text_token_count.unwrap_or(0),
                        });
                        out.push(StreamChunk::done(Some(map_titan_reason(reason)), usage));
                    }
                    out
                })
                .unwrap_or_default(),
        }
    }
}
