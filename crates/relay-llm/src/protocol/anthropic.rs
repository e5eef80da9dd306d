//! Anthropic Messages API dialect
//!
//! The system message is hoisted into the dedicated top-level field; the
//! remaining sequence travels verbatim as role-tagged messages. Streaming
//! delivers typed SSE events whose text deltas are concatenated per chunk.

use relay_config::GenerationParams;
use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, FinishReason, GenerationResponse, Role, StreamChunk, TokenUsage};

// -- Request types --

/// Messages API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate (required by the API)
    pub max_tokens: u32,
    /// System prompt, hoisted out of the message sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages (user/assistant only)
    pub messages: Vec<AnthropicMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Role-tagged message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Text content
    pub content: String,
}

/// Build a wire request, hoisting the system message
pub fn build_request(model: &str, messages: &[ChatMessage], params: &GenerationParams, stream: bool) -> AnthropicRequest {
    let mut system = None;
    let mut conversation = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system = Some(message.content.clone()),
            role => conversation.push(AnthropicMessage {
                role: role.as_str().to_owned(),
                content: message.content.clone(),
            }),
        }
    }

    AnthropicRequest {
        model: model.to_owned(),
        max_tokens: params.max_tokens,
        system,
        messages: conversation,
        temperature: Some(params.temperature),
        top_p: Some(params.top_p),
        stop_sequences: (!params.stop_sequences.is_empty()).then(|| params.stop_sequences.clone()),
        stream: stream.then_some(true),
    }
}

// -- Response types --

/// Messages API response
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    /// Response content blocks
    #[serde(default)]
    pub content: Vec<AnthropicContentBlock>,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block within a response
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    /// Text block
    Text {
        /// The text string
        text: String,
    },
    /// Any non-text block, ignored by the gateway
    #[serde(other)]
    Other,
}

/// Token usage block
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnthropicUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

/// Map an Anthropic stop reason onto the canonical vocabulary
pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "refusal" => FinishReason::Filter,
        // end_turn, stop_sequence
        _ => FinishReason::Stop,
    }
}

/// Convert a wire response into the canonical response
pub fn into_response(wire: AnthropicResponse, model: &str, provider: &str) -> GenerationResponse {
    let content = wire
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            AnthropicContentBlock::Other => None,
        })
        .collect::<String>();

    GenerationResponse {
        content,
        input_tokens: wire.usage.map_or(0, |u| u.input_tokens),
        output_tokens: wire.usage.map_or(0, |u| u.output_tokens),
        finish_reason: wire.stop_reason.as_deref().map_or(FinishReason::Stop, map_stop_reason),
        model: model.to_owned(),
        provider: provider.to_owned(),
    }
}

// -- Streaming types --

/// SSE event types emitted by the Messages API
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Stream started; carries initial usage
    MessageStart {
        /// Partial message metadata
        message: AnthropicStreamMessage,
    },
    /// New content block started
    ContentBlockStart {},
    /// Incremental content within a block
    ContentBlockDelta {
        /// Delta content
        delta: AnthropicStreamDelta,
    },
    /// Content block finished
    ContentBlockStop {},
    /// Message metadata delta (stop reason, output usage)
    MessageDelta {
        /// Delta with stop reason
        delta: AnthropicMessageDelta,
        /// Updated usage
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    /// Stream completed
    MessageStop,
    /// Keep-alive
    Ping,
}

/// Partial message in a `message_start` event
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicStreamMessage {
    /// Initial usage (input tokens)
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Delta content in a `content_block_delta` event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamDelta {
    /// Incremental text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Any other delta type, ignored
    #[serde(other)]
    Other,
}

/// Delta in a `message_delta` event
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicMessageDelta {
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Accumulates usage and stop reason across SSE events
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    input_tokens: u32,
    output_tokens: u32,
    saw_usage: bool,
    finish_reason: Option<FinishReason>,
}

impl AnthropicStreamState {
    /// Absorb one SSE event, yielding canonical chunks
    pub fn absorb(&mut self, event: &AnthropicStreamEvent) -> Vec<StreamChunk> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens;
                    self.saw_usage = true;
                }
                Vec::new()
            }
            AnthropicStreamEvent::ContentBlockDelta {
                delta: AnthropicStreamDelta::TextDelta { text },
            } if !text.is_empty() => vec![StreamChunk::delta(text.clone())],
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens;
                    self.saw_usage = true;
                }
                if let Some(ref reason) = delta.stop_reason {
                    self.finish_reason = Some(map_stop_reason(reason));
                }
                Vec::new()
            }
            AnthropicStreamEvent::MessageStop => {
                let usage = self.saw_usage.then_some(TokenUsage {
                    input_tokens: self.input_tokens,
                    output_tokens: self.output_tokens,
                });
                vec![StreamChunk::done(self.finish_reason.take(), usage)]
            }
            _ => Vec::new(),
        }
    }
}
