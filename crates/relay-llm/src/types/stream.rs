use serde::{Deserialize, Serialize};

use super::response::{FinishReason, TokenUsage};
use crate::error::GatewayError;

/// One element of the canonical chunk stream
///
/// A stream is finite, carries at least one chunk, and ends with exactly
/// one terminal chunk (`Done` or `Error`). On the wire each chunk is one
/// JSON object; the variants are distinguished by their field sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamChunk {
    /// Incremental text
    Delta {
        /// Text fragment to append
        delta: String,
    },
    /// Terminal success marker
    Done {
        /// Always true
        done: bool,
        /// Token usage when the back end reported it; callers must not
        /// assume presence
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
        /// Why generation stopped, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<FinishReason>,
    },
    /// Terminal failure marker
    Error {
        /// Canonical error kind
        error: String,
        /// Human-readable detail
        message: String,
    },
}

impl StreamChunk {
    /// Incremental text chunk
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta { delta: text.into() }
    }

    /// Terminal success chunk
    pub const fn done(finish_reason: Option<FinishReason>, usage: Option<TokenUsage>) -> Self {
        Self::Done {
            done: true,
            usage,
            finish_reason,
        }
    }

    /// Terminal error chunk derived from a canonical error
    pub fn error(err: &GatewayError) -> Self {
        Self::Error {
            error: err.kind().to_owned(),
            message: err.to_string(),
        }
    }

    /// Whether this chunk ends the stream
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
