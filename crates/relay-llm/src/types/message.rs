use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// End-user turn
    User,
    /// Model turn
    Assistant,
}

impl Role {
    /// Canonical lowercase name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the message
    pub role: Role,
    /// Message body; must be non-empty
    pub content: String,
}

impl ChatMessage {
    /// Construct a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Construct a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Construct an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Validate a conversation for generation
///
/// The sequence must start with at most one system message, then
/// alternate user/assistant beginning with user, and end on a user
/// message. Empty bodies are rejected.
pub(crate) fn validate_sequence(messages: &[ChatMessage]) -> Result<(), GatewayError> {
    if messages.is_empty() {
        return Err(GatewayError::InvalidRequest("messages must not be empty".into()));
    }

    if messages.iter().any(|m| m.content.trim().is_empty()) {
        return Err(GatewayError::InvalidRequest("message content must not be empty".into()));
    }

    let conversation = match messages.first() {
        Some(m) if m.role == Role::System => &messages[1..],
        _ => messages,
    };

    if conversation.iter().any(|m| m.role == Role::System) {
        return Err(GatewayError::InvalidRequest(
            "only one system message is allowed, and only at the start".into(),
        ));
    }

    for (i, message) in conversation.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        if message.role != expected {
            return Err(GatewayError::InvalidRequest(format!(
                "messages must alternate user/assistant starting with user (position {i} is {})",
                message.role.as_str()
            )));
        }
    }

    match conversation.last() {
        Some(m) if m.role == Role::User => Ok(()),
        _ => Err(GatewayError::InvalidRequest(
            "a trailing user message is required for generation".into(),
        )),
    }
}
