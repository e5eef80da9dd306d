#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

//! HTTP and WebSocket surface for the relay gateway
//!
//! Request path per turn: auth middleware, rate-limit admission, session
//! load, gateway generate, session save. The middleware stack is ordered
//! so that authentication always precedes admission, and the health
//! surface bypasses both.

mod auth;
mod chat;
mod health;
mod rate_limit;
mod sessions;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing};
use relay_config::GatewayConfig;
use relay_llm::{CircuitBreakerConfig, Gateway};
use relay_ratelimit::RateLimiter;
use relay_session::SessionStore;
use tower_http::trace::TraceLayer;

/// Shared state for route handlers
#[derive(Clone)]
pub(crate) struct AppState {
    pub gateway: Arc<Gateway>,
    pub sessions: Arc<dyn SessionStore>,
    pub limiter: Arc<RateLimiter>,
    pub session_ttl: Duration,
    pub rate_limit_enabled: bool,
}

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration, constructing all adapters
    ///
    /// # Errors
    ///
    /// Returns an error if the rate limiter or session store cannot be
    /// constructed from the configuration.
    pub async fn new(config: GatewayConfig, registry: Arc<relay_config::ModelRegistry>) -> anyhow::Result<Self> {
        let gateway = Arc::new(Gateway::from_registry(registry, CircuitBreakerConfig::default()).await);
        Self::with_gateway(config, gateway)
    }

    /// Build the server around an existing gateway
    ///
    /// Lets embedders and tests supply their own provider set.
    pub fn with_gateway(config: GatewayConfig, gateway: Arc<Gateway>) -> anyhow::Result<Self> {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit)?);
        let sessions = relay_session::create_store(&config.session)?;

        let state = AppState {
            gateway,
            sessions,
            limiter: Arc::clone(&limiter),
            session_ttl: Duration::from_secs(config.session.ttl_seconds),
            rate_limit_enabled: config.rate_limit.enabled,
        };

        let mut app = Router::new()
            .route("/chat", routing::post(chat::chat_handler))
            .route(
                "/sessions/{id}",
                routing::get(sessions::get_session).delete(sessions::delete_session),
            )
            .route("/ws/chat", routing::get(ws::ws_handler))
            .route("/health", routing::get(health::health_handler))
            .route("/ready", routing::get(health::ready_handler))
            .route("/live", routing::get(health::live_handler))
            .with_state(state);

        app = app.layer(TraceLayer::new_for_http());

        // Layers wrap bottom-up: rate limiting added first so the auth
        // layer added after it runs first on every request
        let rate_limit_state = Arc::new(rate_limit::RateLimitState {
            limiter,
            enabled: config.rate_limit.enabled,
        });
        app = app.layer(axum::middleware::from_fn(move |req, next| {
            let state = Arc::clone(&rate_limit_state);
            async move { rate_limit::rate_limit_middleware(state, req, next).await }
        }));

        let auth_config = Arc::new(config.auth);
        app = app.layer(axum::middleware::from_fn(move |req, next| {
            let config = Arc::clone(&auth_config);
            async move { auth::auth_middleware(config, req, next).await }
        }));

        Ok(Self {
            router: app,
            listen_address: config.server.listen,
        })
    }

    /// Configured listen address
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve requests until the cancellation token fires
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails.
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "relay listening");

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("graceful shutdown initiated");
        })
        .await?;

        Ok(())
    }
}
