//! OpenAI chat-completions dialect
//!
//! Shared by every OpenAI-compatible back end (Azure OpenAI, Groq,
//! self-hosted runtimes). Messages travel with roles as-is; streaming is
//! SSE with `choices[].delta.content` and a `[DONE]` sentinel.

use relay_config::GenerationParams;
use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, FinishReason, GenerationResponse, StreamChunk, TokenUsage};

// -- Request types --

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRequest {
    /// Model (or Azure deployment) identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OpenAiMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Message within a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    /// Message role
    pub role: String,
    /// Text content
    pub content: String,
}

/// Build a wire request from canonical inputs
pub fn build_request(model: &str, messages: &[ChatMessage], params: &GenerationParams, stream: bool) -> OpenAiRequest {
    OpenAiRequest {
        model: model.to_owned(),
        messages: messages
            .iter()
            .map(|m| OpenAiMessage {
                role: m.role.as_str().to_owned(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: Some(params.temperature),
        top_p: Some(params.top_p),
        max_tokens: Some(params.max_tokens),
        stop: (!params.stop_sequences.is_empty()).then(|| params.stop_sequences.clone()),
        stream: stream.then_some(true),
    }
}

// -- Response types --

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiResponse {
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

/// Choice within a response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoice {
    /// Generated message
    pub message: OpenAiChoiceMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message within a response choice
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoiceMessage {
    /// Text content
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage block
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OpenAiUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u32,
}

/// Map a wire finish reason onto the canonical vocabulary
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::Filter,
        "error" => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

/// Convert a wire response into the canonical response
pub fn into_response(wire: OpenAiResponse, model: &str, provider: &str) -> GenerationResponse {
    let (content, finish_reason) = wire.choices.into_iter().next().map_or_else(
        || (String::new(), FinishReason::Error),
        |choice| {
            (
                choice.message.content.unwrap_or_default(),
                choice.finish_reason.as_deref().map_or(FinishReason::Stop, map_finish_reason),
            )
        },
    );

    GenerationResponse {
        content,
        input_tokens: wire.usage.map_or(0, |u| u.prompt_tokens),
        output_tokens: wire.usage.map_or(0, |u| u.completion_tokens),
        finish_reason,
        model: model.to_owned(),
        provider: provider.to_owned(),
    }
}

// -- Streaming types --

/// Streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChunk {
    /// Delta choices
    #[serde(default)]
    pub choices: Vec<OpenAiStreamChoice>,
    /// Usage, present on the final chunk for some back ends
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiStreamChoice {
    /// Incremental delta
    #[serde(default)]
    pub delta: OpenAiStreamDelta,
    /// Finish reason, present on the final content chunk
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content within a streaming choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiStreamDelta {
    /// Incremental text content
    #[serde(default)]
    pub content: Option<String>,
}

/// Accumulates finish reason and usage across SSE chunks
///
/// The dialect spreads terminal information over several frames (a
/// finish-reason chunk, an optional usage chunk, then `[DONE]`); the
/// canonical terminal chunk is emitted once, at the sentinel.
#[derive(Debug, Default)]
pub struct OpenAiStreamState {
    finish_reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
}

impl OpenAiStreamState {
    /// Absorb one wire chunk, yielding canonical deltas
    pub fn absorb(&mut self, chunk: &OpenAiStreamChunk) -> Vec<StreamChunk> {
        if let Some(usage) = chunk.usage {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            });
        }

        let mut out = Vec::new();
        for choice in &chunk.choices {
            if let Some(ref content) = choice.delta.content
                && !content.is_empty()
            {
                out.push(StreamChunk::delta(content.clone()));
            }
            if let Some(ref reason) = choice.finish_reason {
                self.finish_reason = Some(map_finish_reason(reason));
            }
        }
        out
    }

    /// Terminal chunk for the `[DONE]` sentinel
    pub fn finish(&mut self) -> StreamChunk {
        StreamChunk::done(self.finish_reason.take(), self.usage.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn params() -> GenerationParams {
        GenerationParams {
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 256,
            stop_sequences: vec!["END".into()],
            timeout: std::time::Duration::from_secs(30),
        }
    }

    #[test]
    fn request_carries_roles_verbatim() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hi"),
        ];
        let wire = build_request("gpt-4o", &messages, &params(), false);

        assert_eq!(wire.model, "gpt-4o");
        assert_eq!(wire.messages[0].role, Role::System.as_str());
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.stop.as_deref(), Some(&["END".to_owned()][..]));
        assert!(wire.stream.is_none());
    }

    #[test]
    fn response_maps_usage_and_finish() {
        let wire: OpenAiResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"content": "hello"}, "finish_reason": "length"}],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3}
        }))
        .unwrap();

        let response = into_response(wire, "m", "groq");
        assert_eq!(response.content, "hello");
        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.input_tokens, 7);
        assert_eq!(response.output_tokens, 3);
    }

    #[test]
    fn stream_state_defers_terminal_until_done() {
        let mut state = OpenAiStreamState::default();

        let chunk: OpenAiStreamChunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {"content": "He"}}]
        }))
        .unwrap();
        assert_eq!(state.absorb(&chunk), vec![StreamChunk::delta("He")]);

        let chunk: OpenAiStreamChunk = serde_json::from_value(serde_json::json!({
            "choices": [{"delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }))
        .unwrap();
        assert!(state.absorb(&chunk).is_empty());

        match state.finish() {
            StreamChunk::Done {
                done,
                usage,
                finish_reason,
            } => {
                assert!(done);
                assert_eq!(finish_reason, Some(FinishReason::Stop));
                assert_eq!(usage.map(|u| u.output_tokens), Some(5));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }
}
