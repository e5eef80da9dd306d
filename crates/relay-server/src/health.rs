//! Health, readiness, and liveness handlers
//!
//! Unauthenticated and unmetered. The health poll probes every provider
//! in parallel without touching circuit-breaker state.

use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::AppState;

/// Per-provider probe timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle `GET /health`
pub(crate) async fn health_handler(State(state): State<AppState>) -> Response {
    let report = state.gateway.health_check_all(PROBE_TIMEOUT).await;

    let status = if report.healthy { "ok" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "providers": report.providers,
    }))
    .into_response()
}

/// Handle `GET /ready`
pub(crate) async fn ready_handler() -> Response {
    Json(serde_json::json!({"status": "ready"})).into_response()
}

/// Handle `GET /live`
pub(crate) async fn live_handler() -> Response {
    Json(serde_json::json!({"status": "alive"})).into_response()
}
