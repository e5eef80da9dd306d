//! Session inspection routes
//!
//! `GET`/`DELETE /sessions/{id}` return the stored state only to the
//! tenant that owns it; anyone else sees `404`, so foreign callers
//! cannot distinguish "absent" from "not yours".

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use http::StatusCode;
use relay_core::Identity;
use serde_json::Value;

use crate::AppState;

/// Handle `GET /sessions/{id}`
pub(crate) async fn get_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Response {
    match load_owned(&state, &identity, &id).await {
        Ok(Some(blob)) => Json(blob).into_response(),
        Ok(None) => not_found(),
        Err(response) => response,
    }
}

/// Handle `DELETE /sessions/{id}`
pub(crate) async fn delete_session(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Response {
    match load_owned(&state, &identity, &id).await {
        Ok(Some(_)) => match state.sessions.delete(&id).await {
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
            Err(e) => store_failure(&e.to_string()),
        },
        Ok(None) => not_found(),
        Err(response) => response,
    }
}

/// Load a session iff the caller's tenant owns it
async fn load_owned(state: &AppState, identity: &Identity, id: &str) -> Result<Option<Value>, Response> {
    let blob = state
        .sessions
        .load(id)
        .await
        .map_err(|e| store_failure(&e.to_string()))?;

    Ok(blob.filter(|value| {
        value
            .get("tenant_id")
            .and_then(Value::as_str)
            .is_some_and(|tenant| tenant == identity.tenant_id)
    }))
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "not_found", "message": "session not found"})),
    )
        .into_response()
}

fn store_failure(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "session_store_error", "message": message})),
    )
        .into_response()
}
