//! Chat turn handling
//!
//! One turn: load the caller's session, run generation through the
//! gateway, append the reply, and save the session with a refreshed TTL.
//! Sessions are stamped with the owning tenant and a foreign tenant's
//! session reads as absent.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use http::StatusCode;
use http::header::{HeaderValue, RETRY_AFTER};
use relay_core::{HttpError, Identity};
use relay_llm::GatewayError;
use relay_llm::types::{ChatMessage, FinishReason, GenConfig, GenerationRequest, StreamChunk};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Retry hint sent when every provider is exhausted
const EXHAUSTED_RETRY_AFTER_SECS: u64 = 30;

/// `POST /chat` request body; also the per-frame WebSocket request
#[derive(Debug, Deserialize)]
pub(crate) struct ChatRequest {
    /// Single user message, appended to the session history
    #[serde(default)]
    pub message: Option<String>,
    /// Full conversation, used verbatim instead of the history
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    /// Session to continue; a fresh one is created when absent
    #[serde(default)]
    pub session_id: Option<String>,
    /// Agent name for registry tier resolution
    #[serde(default)]
    pub agent: Option<String>,
    /// Call-site generation overrides
    #[serde(default)]
    pub config: GenConfig,
}

/// `POST /chat` response body
#[derive(Debug, Serialize)]
pub(crate) struct ChatResponse {
    pub session_id: String,
    pub content: String,
    pub model: String,
    pub provider: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Session blob persisted between turns
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionState {
    /// Owning tenant; verified on every load
    pub tenant_id: String,
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
    /// Unix timestamp of session creation
    pub created_at: u64,
    /// Unix timestamp of the last save
    pub updated_at: u64,
}

/// A resolved turn, ready for the gateway
pub(crate) struct Turn {
    pub session_id: String,
    pub agent: String,
    pub request: GenerationRequest,
    pub created_at: u64,
}

/// Why a turn could not be prepared
pub(crate) enum TurnRejection {
    /// Session absent, expired, or owned by another tenant
    SessionNotFound,
    /// Caller input unusable before reaching the gateway
    BadRequest(String),
    /// Session store failure
    StoreFailure(String),
}

impl TurnRejection {
    pub(crate) fn into_response(self) -> Response {
        let (status, error, message) = self.parts();
        (
            status,
            Json(serde_json::json!({"error": error, "message": message})),
        )
            .into_response()
    }

    pub(crate) fn into_chunk(self) -> StreamChunk {
        let (_, error, message) = self.parts();
        StreamChunk::Error {
            error: error.to_owned(),
            message,
        }
    }

    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            Self::SessionNotFound => (StatusCode::NOT_FOUND, "not_found", "session not found".to_owned()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            Self::StoreFailure(message) => (StatusCode::INTERNAL_SERVER_ERROR, "session_store_error", message),
        }
    }
}

/// Handle `POST /chat`
pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let turn = match prepare_turn(&state, &identity, request).await {
        Ok(turn) => turn,
        Err(rejection) => return rejection.into_response(),
    };

    match state.gateway.generate(&turn.agent, &turn.request).await {
        Ok(generation) => {
            save_turn(&state, &identity, &turn, &generation.content).await;
            Json(ChatResponse {
                session_id: turn.session_id,
                content: generation.content,
                model: generation.model,
                provider: generation.provider,
                input_tokens: generation.input_tokens,
                output_tokens: generation.output_tokens,
                finish_reason: generation.finish_reason,
            })
            .into_response()
        }
        Err(error) => error_response(&error),
    }
}

/// Load the session and assemble the generation request for one turn
pub(crate) async fn prepare_turn(
    state: &AppState,
    identity: &Identity,
    request: ChatRequest,
) -> Result<Turn, TurnRejection> {
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let existing = state
        .sessions
        .load(&session_id)
        .await
        .map_err(|e| TurnRejection::StoreFailure(e.to_string()))?;

    let existing: Option<SessionState> = match existing {
        Some(blob) => {
            let parsed: SessionState = serde_json::from_value(blob)
                .map_err(|e| TurnRejection::StoreFailure(format!("corrupt session state: {e}")))?;
            // A foreign tenant's session is indistinguishable from an
            // absent one
            if parsed.tenant_id != identity.tenant_id {
                return Err(TurnRejection::SessionNotFound);
            }
            Some(parsed)
        }
        None => None,
    };

    let created_at = existing.as_ref().map_or_else(now_secs, |s| s.created_at);

    let messages = match (request.messages, request.message) {
        (Some(messages), _) if !messages.is_empty() => messages,
        (_, Some(text)) if !text.trim().is_empty() => {
            let mut history = existing.map(|s| s.messages).unwrap_or_default();
            history.push(ChatMessage::user(text));
            history
        }
        _ => {
            return Err(TurnRejection::BadRequest(
                "either 'message' or 'messages' is required".to_owned(),
            ));
        }
    };

    Ok(Turn {
        session_id,
        agent: request.agent.unwrap_or_else(|| "default".to_owned()),
        request: GenerationRequest {
            messages,
            config: request.config,
        },
        created_at,
    })
}

/// Persist the turn's conversation including the assistant reply
///
/// Runs only after generation completed (or after the terminal stream
/// chunk); a canceled turn never writes a partial update. Save failures
/// are logged, not surfaced: the reply was already produced.
pub(crate) async fn save_turn(state: &AppState, identity: &Identity, turn: &Turn, reply: &str) {
    let mut messages = turn.request.messages.clone();
    messages.push(ChatMessage::assistant(reply));

    let blob = SessionState {
        tenant_id: identity.tenant_id.clone(),
        messages,
        created_at: turn.created_at,
        updated_at: now_secs(),
    };

    match serde_json::to_value(&blob) {
        Ok(value) => {
            if let Err(e) = state.sessions.save(&turn.session_id, value, state.session_ttl).await {
                tracing::error!(session_id = %turn.session_id, error = %e, "failed to save session");
            }
        }
        Err(e) => tracing::error!(session_id = %turn.session_id, error = %e, "failed to serialize session"),
    }
}

/// Map a canonical error onto the HTTP surface
pub(crate) fn error_response(error: &GatewayError) -> Response {
    let body = serde_json::json!({
        "error": error.error_kind(),
        "message": error.client_message(),
    });
    let mut response = (error.status_code(), Json(body)).into_response();

    let retry_after = match error {
        GatewayError::RateLimited { retry_after, .. } => Some(retry_after.unwrap_or(EXHAUSTED_RETRY_AFTER_SECS)),
        GatewayError::NoProviderAvailable { .. } => Some(EXHAUSTED_RETRY_AFTER_SECS),
        _ => None,
    };
    if let Some(secs) = retry_after
        && let Ok(value) = HeaderValue::from_str(&secs.to_string())
    {
        response.headers_mut().insert(RETRY_AFTER, value);
    }

    response
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
