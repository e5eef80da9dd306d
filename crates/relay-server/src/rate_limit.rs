//! Rate-limit admission middleware
//!
//! Derives the limiter identity (tenant header, tenant query parameter,
//! then client IP), admits before any handler work, and stamps the
//! `X-RateLimit-*` headers onto every metered response. The health
//! surface is exempt so probes never consume budget.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use http::StatusCode;
use relay_ratelimit::{Decision, RateLimiter};

/// Paths never metered
const EXEMPT_PATHS: [&str; 3] = ["/health", "/ready", "/live"];

/// State shared with the middleware closure
pub(crate) struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub enabled: bool,
}

/// Admission middleware
pub(crate) async fn rate_limit_middleware(state: Arc<RateLimitState>, request: Request, next: Next) -> Response {
    if !state.enabled || EXEMPT_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let identity = derive_identity(
        request.headers(),
        request.uri().query(),
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0),
    );

    let decision = state.limiter.admit(&identity).await;

    if !decision.allowed {
        tracing::warn!(%identity, retry_after = ?decision.retry_after, "rate limit exceeded");
        return denial_response(&decision);
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    response
}

/// Limiter identity for a request, first match wins: tenant header,
/// tenant query parameter, forwarded-for chain, socket peer
pub(crate) fn derive_identity(headers: &HeaderMap, query: Option<&str>, peer: Option<SocketAddr>) -> String {
    if let Some(tenant) = headers.get("x-tenant-id").and_then(|v| v.to_str().ok())
        && !tenant.is_empty()
    {
        return format!("tenant:{tenant}");
    }

    if let Some(tenant) = query.and_then(tenant_query_param)
        && !tenant.is_empty()
    {
        return format!("tenant:{tenant}");
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && !first.trim().is_empty()
    {
        return format!("ip:{}", first.trim());
    }

    peer.map_or_else(|| "ip:unknown".to_owned(), |addr| format!("ip:{}", addr.ip()))
}

fn tenant_query_param(query: &str) -> Option<&str> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("tenant_id="))
}

/// Stamp `X-RateLimit-*` headers onto a response
pub(crate) fn apply_headers(headers: &mut HeaderMap, decision: &Decision) {
    let entries = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_at.to_string()),
    ];
    for (name, value) in entries {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// 429 response carrying the retry contract
pub(crate) fn denial_response(decision: &Decision) -> Response {
    let retry_after = decision.retry_after.unwrap_or(1);
    let body = serde_json::json!({
        "error": "rate_limit_exceeded",
        "message": "Too many requests. Please try again later.",
        "retry_after": retry_after,
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    apply_headers(response.headers_mut(), decision);
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(RETRY_AFTER, value);
    }
    response
}
