use serde::{Deserialize, Serialize};

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Output token budget exhausted
    Length,
    /// Back-end safety system suppressed output
    Filter,
    /// Generation ended abnormally
    Error,
}

/// Token counts reported by a back end
///
/// Best effort: zero when the back end omits them. Unsigned by
/// construction, so counts are never negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt
    pub input_tokens: u32,
    /// Tokens produced in the completion
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Combined prompt and completion tokens
    pub const fn total(self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Canonical result of one generation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Generated text
    pub content: String,
    /// Prompt token count (best effort)
    pub input_tokens: u32,
    /// Completion token count (best effort)
    pub output_tokens: u32,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// Model that produced the response
    pub model: String,
    /// Provider that served the call
    pub provider: String,
}
