//! WebSocket chat endpoint
//!
//! Bidirectional: each client frame is one chat request; the server
//! answers with canonical chunk frames, one JSON object per frame,
//! terminated by `{done: true}` or `{error}`. A connection serves many
//! turns; admission is checked per turn, before any provider I/O.
//! Client disconnect mid-stream drops the chunk receiver, which cancels
//! the upstream call and skips the session save.

use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Extension;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use http::header::HeaderMap;
use relay_core::Identity;
use relay_llm::types::StreamChunk;
use serde::Serialize;

use crate::chat::{ChatRequest, prepare_turn, save_turn};
use crate::rate_limit::derive_identity;
use crate::AppState;

/// Hello frame sent once per connection, before any chunks
#[derive(Debug, Serialize)]
struct ConnectedFrame<'a> {
    r#type: &'static str,
    session_id: &'a str,
}

/// Handle `GET /ws/chat` upgrades
pub(crate) async fn ws_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let limit_key = derive_identity(&headers, None, Some(peer));
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, limit_key))
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity, limit_key: String) {
    let (mut sender, mut receiver) = socket.split();

    // Connection-scoped session: every turn on this socket shares it
    let session_id = uuid::Uuid::new_v4().to_string();
    let hello = ConnectedFrame {
        r#type: "connected",
        session_id: &session_id,
    };
    if send_json(&mut sender, &hello).await.is_err() {
        return;
    }

    while let Some(Ok(ws_msg)) = receiver.next().await {
        let text = match ws_msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let mut request: ChatRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let chunk = StreamChunk::Error {
                    error: "invalid_request".to_owned(),
                    message: format!("invalid chat frame: {e}"),
                };
                if send_json(&mut sender, &chunk).await.is_err() {
                    return;
                }
                continue;
            }
        };
        request.session_id.get_or_insert_with(|| session_id.clone());

        // Admission precedes any provider I/O
        if state.rate_limit_enabled {
            let decision = state.limiter.admit(&limit_key).await;
            if !decision.allowed {
                let chunk = StreamChunk::Error {
                    error: "rate_limited".to_owned(),
                    message: format!(
                        "rate limit exceeded, retry after {}s",
                        decision.retry_after.unwrap_or(1)
                    ),
                };
                if send_json(&mut sender, &chunk).await.is_err() {
                    return;
                }
                continue;
            }
        }

        let turn = match prepare_turn(&state, &identity, request).await {
            Ok(turn) => turn,
            Err(rejection) => {
                if send_json(&mut sender, &rejection.into_chunk()).await.is_err() {
                    return;
                }
                continue;
            }
        };

        let mut rx = match state.gateway.generate_stream(&turn.agent, &turn.request).await {
            Ok(rx) => rx,
            Err(error) => {
                if send_json(&mut sender, &StreamChunk::error(&error)).await.is_err() {
                    return;
                }
                continue;
            }
        };

        let mut reply = String::new();
        let mut completed = false;

        while let Some(chunk) = rx.recv().await {
            if let StreamChunk::Delta { ref delta } = chunk {
                reply.push_str(delta);
            }
            let terminal = chunk.is_terminal();
            let succeeded = matches!(chunk, StreamChunk::Done { .. });

            if send_json(&mut sender, &chunk).await.is_err() {
                // Client gone: dropping the receiver cancels upstream,
                // and the session is not saved
                return;
            }

            if terminal {
                completed = succeeded;
                break;
            }
        }

        if completed {
            save_turn(&state, &identity, &turn, &reply).await;
        }
    }
}

async fn send_json<T: Serialize>(sender: &mut SplitSink<WebSocket, WsMessage>, value: &T) -> Result<(), ()> {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize frame");
            return Ok(());
        }
    };
    sender.send(WsMessage::Text(json.into())).await.map_err(|_| ())
}
