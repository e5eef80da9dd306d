//! Google Generative Language API dialect (Gemini)
//!
//! The system message maps to `systemInstruction`; the alternating
//! conversation becomes `contents[]` with roles `user`/`model`.
//! Streaming is SSE where every frame is a complete response object
//! carrying incremental candidate deltas.

use relay_config::GenerationParams;
use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, FinishReason, GenerationResponse, Role, StreamChunk, TokenUsage};

// -- Request types --

/// `generateContent` request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    /// Conversation contents
    pub contents: Vec<GoogleContent>,
    /// System instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GoogleContent>,
    /// Generation configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GoogleGenerationConfig>,
}

/// Role-tagged content with parts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleContent {
    /// "user" or "model"; absent on system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    pub parts: Vec<GooglePart>,
}

/// Text part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GooglePart {
    /// The text string
    pub text: String,
}

/// Generation configuration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerationConfig {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Build a wire request from canonical inputs
pub fn build_request(messages: &[ChatMessage], params: &GenerationParams) -> GoogleRequest {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                system_instruction = Some(GoogleContent {
                    role: None,
                    parts: vec![GooglePart {
                        text: message.content.clone(),
                    }],
                });
            }
            role => {
                let wire_role = match role {
                    Role::Assistant => "model",
                    _ => "user",
                };
                contents.push(GoogleContent {
                    role: Some(wire_role.to_owned()),
                    parts: vec![GooglePart {
                        text: message.content.clone(),
                    }],
                });
            }
        }
    }

    GoogleRequest {
        contents,
        system_instruction,
        generation_config: Some(GoogleGenerationConfig {
            temperature: Some(params.temperature),
            top_p: Some(params.top_p),
            max_output_tokens: Some(params.max_tokens),
            stop_sequences: (!params.stop_sequences.is_empty()).then(|| params.stop_sequences.clone()),
        }),
    }
}

// -- Response types --

/// `generateContent` response; stream frames share this shape
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    /// Generated candidates
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    /// Token usage metadata
    #[serde(default)]
    pub usage_metadata: Option<GoogleUsageMetadata>,
}

/// Generated candidate
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCandidate {
    /// Generated content
    #[serde(default)]
    pub content: Option<GoogleContent>,
    /// Finish reason (e.g. "STOP", "MAX_TOKENS", "SAFETY")
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage metadata
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsageMetadata {
    /// Prompt token count
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Candidates token count
    #[serde(default)]
    pub candidates_token_count: u32,
}

/// Map a Google finish reason onto the canonical vocabulary
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" => FinishReason::Filter,
        "STOP" => FinishReason::Stop,
        _ => FinishReason::Error,
    }
}

fn candidate_text(candidate: &GoogleCandidate) -> String {
    candidate
        .content
        .as_ref()
        .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default()
}

/// Convert a wire response into the canonical response
pub fn into_response(wire: &GoogleResponse, model: &str, provider: &str) -> GenerationResponse {
    let (content, finish_reason) = wire.candidates.first().map_or_else(
        || (String::new(), FinishReason::Error),
        |candidate| {
            (
                candidate_text(candidate),
                candidate
                    .finish_reason
                    .as_deref()
                    .map_or(FinishReason::Stop, map_finish_reason),
            )
        },
    );

    GenerationResponse {
        content,
        input_tokens: wire.usage_metadata.map_or(0, |u| u.prompt_token_count),
        output_tokens: wire.usage_metadata.map_or(0, |u| u.candidates_token_count),
        finish_reason,
        model: model.to_owned(),
        provider: provider.to_owned(),
    }
}

/// Convert one stream frame into canonical chunks
///
/// A frame carrying a finish reason also terminates the canonical stream.
pub fn chunk_into(wire: &GoogleResponse) -> Vec<StreamChunk> {
    let mut out = Vec::new();

    for candidate in &wire.candidates {
        let text = candidate_text(candidate);
        if !text.is_empty() {
            out.push(StreamChunk::delta(text));
        }
        if let Some(ref reason) = candidate.finish_reason {
            let usage = wire.usage_metadata.map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            });
            out.push(StreamChunk::done(Some(map_finish_reason(reason)), usage));
        }
    }

    out
}
