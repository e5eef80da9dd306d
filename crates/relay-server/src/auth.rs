//! Bearer-token authentication middleware
//!
//! Validates the JWT signature with the configured shared secret and
//! algorithm, enforces expiry when the token carries one, and requires
//! the `tenant_id` claim. When auth is disabled, a fixed demo identity
//! is substituted so local development needs no tokens.

use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use jwt_compact::alg::{Hs256, Hs256Key, Hs384, Hs384Key, Hs512, Hs512Key};
use jwt_compact::{AlgorithmExt, TimeOptions, Token, UntrustedToken};
use relay_config::{AuthConfig, JwtAlgorithm};
use relay_core::Identity;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

/// Custom claims the gateway consumes
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    /// Tenant the token acts on behalf of (required)
    #[serde(default)]
    tenant_id: Option<String>,
    /// Roles; a single string or a list of strings
    #[serde(default)]
    user_roles: Option<serde_json::Value>,
}

/// Authenticate requests and stamp the request-scoped identity
pub(crate) async fn auth_middleware(config: Arc<AuthConfig>, mut request: Request, next: Next) -> Response {
    if config.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    if !config.enabled {
        request.extensions_mut().insert(Identity::demo());
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized("missing Authorization header");
    };

    match validate_token(&config, token) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(message) => {
            tracing::warn!(%message, "bearer token rejected");
            unauthorized(&message)
        }
    }
}

/// Validate a bearer token and derive the request identity
fn validate_token(config: &AuthConfig, raw: &str) -> Result<Identity, String> {
    let Some(ref secret) = config.jwt_secret else {
        // Startup validation makes this unreachable when auth is enabled
        return Err("signing secret not configured".to_owned());
    };
    let secret = secret.expose_secret().as_bytes();

    let untrusted = UntrustedToken::new(raw).map_err(|e| format!("malformed token: {e}"))?;

    let token: Token<TokenClaims> = match config.jwt_algorithm {
        JwtAlgorithm::Hs256 => Hs256.validator(&Hs256Key::new(secret)).validate(&untrusted),
        JwtAlgorithm::Hs384 => Hs384.validator(&Hs384Key::new(secret)).validate(&untrusted),
        JwtAlgorithm::Hs512 => Hs512.validator(&Hs512Key::new(secret)).validate(&untrusted),
    }
    .map_err(|e| format!("invalid token: {e}"))?;

    let claims = token.claims();

    if claims.expiration.is_some() {
        claims
            .validate_expiration(&TimeOptions::default())
            .map_err(|_| "token has expired".to_owned())?;
    }

    let tenant_id = claims
        .custom
        .tenant_id
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "token missing required claim: tenant_id".to_owned())?;

    Ok(Identity {
        tenant_id,
        roles: parse_roles(claims.custom.user_roles.as_ref()),
        expiry: claims
            .expiration
            .and_then(|exp| u64::try_from(exp.timestamp()).ok()),
    })
}

/// Accept roles as a single string or a list of strings
fn parse_roles(raw: Option<&serde_json::Value>) -> Vec<String> {
    match raw {
        Some(serde_json::Value::String(role)) => vec![role.clone()],
        Some(serde_json::Value::Array(roles)) => roles
            .iter()
            .filter_map(|r| r.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

fn unauthorized(message: &str) -> Response {
    let body = serde_json::json!({
        "error": "unauthorized",
        "message": message,
    });

    let mut response = (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
