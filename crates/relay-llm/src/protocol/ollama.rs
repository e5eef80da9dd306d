//! Ollama `/api/chat` dialect
//!
//! Requests carry messages as-is plus an `options` object; responses and
//! stream frames are newline-delimited JSON objects with a `done` flag
//! and token counts in `prompt_eval_count`/`eval_count`.

use relay_config::GenerationParams;
use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, FinishReason, GenerationResponse, StreamChunk, TokenUsage};

// -- Request types --

/// Chat request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    /// Model name (e.g. "llama3.2")
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OllamaMessage>,
    /// Whether to stream
    pub stream: bool,
    /// Sampling options
    pub options: OllamaOptions,
}

/// Role-tagged message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    /// Message role
    pub role: String,
    /// Text content
    pub content: String,
}

/// Sampling options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaOptions {
    /// Sampling temperature
    pub temperature: f64,
    /// Maximum tokens to generate
    pub num_predict: u32,
    /// Nucleus sampling threshold
    pub top_p: f64,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Build a wire request from canonical inputs
pub fn build_request(model: &str, messages: &[ChatMessage], params: &GenerationParams, stream: bool) -> OllamaChatRequest {
    OllamaChatRequest {
        model: model.to_owned(),
        messages: messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_owned(),
                content: m.content.clone(),
            })
            .collect(),
        stream,
        options: OllamaOptions {
            temperature: params.temperature,
            num_predict: params.max_tokens,
            top_p: params.top_p,
            stop: (!params.stop_sequences.is_empty()).then(|| params.stop_sequences.clone()),
        },
    }
}

// -- Response types --

/// Chat response; stream frames share this shape
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatResponse {
    /// Generated message fragment
    #[serde(default)]
    pub message: Option<OllamaMessage>,
    /// Whether generation has finished
    #[serde(default)]
    pub done: bool,
    /// Why generation finished (present on the final frame)
    #[serde(default)]
    pub done_reason: Option<String>,
    /// Prompt tokens (final frame)
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    /// Completion tokens (final frame)
    #[serde(default)]
    pub eval_count: Option<u32>,
}

/// Model listing from `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaTagsResponse {
    /// Installed models
    #[serde(default)]
    pub models: Vec<OllamaModelInfo>,
}

/// Installed model entry
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModelInfo {
    /// Model name
    pub name: String,
}

fn usage_of(wire: &OllamaChatResponse) -> Option<TokenUsage> {
    match (wire.prompt_eval_count, wire.eval_count) {
        (None, None) => None,
        (input, output) => Some(TokenUsage {
            input_tokens: input.unwrap_or(0),
            output_tokens: output.unwrap_or(0),
        }),
    }
}

fn finish_of(wire: &OllamaChatResponse) -> FinishReason {
    match wire.done_reason.as_deref() {
        Some("length") => FinishReason::Length,
        _ if wire.done => FinishReason::Stop,
        _ => FinishReason::Length,
    }
}

/// Convert a non-streaming wire response into the canonical response
pub fn into_response(wire: &OllamaChatResponse, model: &str, provider: &str) -> GenerationResponse {
    let usage = usage_of(wire).unwrap_or_default();
    GenerationResponse {
        content: wire.message.as_ref().map(|m| m.content.clone()).unwrap_or_default(),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        finish_reason: finish_of(wire),
        model: model.to_owned(),
        provider: provider.to_owned(),
    }
}

/// Convert one stream frame into canonical chunks
pub fn chunk_into(wire: &OllamaChatResponse) -> Vec<StreamChunk> {
    let mut out = Vec::new();

    if let Some(ref message) = wire.message
        && !message.content.is_empty()
    {
        out.push(StreamChunk::delta(message.content.clone()));
    }
    if wire.done {
        out.push(StreamChunk::done(Some(finish_of(wire)), usage_of(wire)));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_sampling_parameters() {
        let params = GenerationParams {
            temperature: 0.5,
            top_p: 0.8,
            max_tokens: 64,
            stop_sequences: vec!["STOP".into()],
            timeout: std::time::Duration::from_secs(10),
        };
        let wire = build_request("llama3.2", &[ChatMessage::user("hi")], &params, true);

        assert_eq!(wire.options.num_predict, 64);
        assert_eq!(wire.options.stop.as_deref(), Some(&["STOP".to_owned()][..]));
        assert!(wire.stream);
    }

    #[test]
    fn final_frame_yields_delta_then_done() {
        let frame: OllamaChatResponse = serde_json::from_value(serde_json::json!({
            "message": {"role": "assistant", "content": "!"},
            "done": true,
            "prompt_eval_count": 5,
            "eval_count": 9
        }))
        .unwrap();

        let chunks = chunk_into(&frame);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], StreamChunk::delta("!"));
        match &chunks[1] {
            StreamChunk::Done { usage, .. } => {
                assert_eq!(usage.map(|u| u.output_tokens), Some(9));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn mid_stream_frame_yields_only_delta() {
        let frame: OllamaChatResponse = serde_json::from_value(serde_json::json!({
            "message": {"role": "assistant", "content": "He"},
            "done": false
        }))
        .unwrap();

        assert_eq!(chunk_into(&frame), vec![StreamChunk::delta("He")]);
    }
}
