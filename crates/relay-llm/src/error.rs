use http::StatusCode;
use relay_core::HttpError;
use thiserror::Error;

/// Canonical error taxonomy shared by all adapters and the gateway
///
/// Adapters translate back-end failures into these kinds; the gateway
/// decides from the kind alone whether the request may move to the next
/// provider in the fallback chain.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential missing or rejected by the back end
    #[error("authentication failed for provider {provider}")]
    Auth {
        /// Provider that rejected the credential
        provider: String,
    },

    /// Provider-imposed throttling
    #[error("rate limited by provider {provider}")]
    RateLimited {
        /// Throttling provider
        provider: String,
        /// Seconds the provider asked us to wait, when it said
        retry_after: Option<u64>,
    },

    /// Requested model unknown to the provider
    #[error("model {model} not found on provider {provider}")]
    ModelNotFound {
        /// Provider that lacks the model
        provider: String,
        /// Model identifier
        model: String,
    },

    /// Malformed prompt or parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Back end refused to produce output
    #[error("content filtered by provider {provider}")]
    ContentFilter {
        /// Filtering provider
        provider: String,
    },

    /// Per-call deadline exceeded
    #[error("request to provider {provider} timed out")]
    Timeout {
        /// Provider that failed to answer in time
        provider: String,
    },

    /// Back end down or returning server errors
    #[error("provider {provider} unavailable: {message}")]
    Unavailable {
        /// Failing provider
        provider: String,
        /// Upstream detail
        message: String,
    },

    /// Transport-level failure before a response arrived
    #[error("network error talking to provider {provider}: {message}")]
    Network {
        /// Unreachable provider
        provider: String,
        /// Transport detail
        message: String,
    },

    /// Caller abandoned the request
    #[error("request canceled")]
    Canceled,

    /// Startup or registry problem
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every candidate was skipped or exhausted
    #[error("no provider available (last tried: {last_tried})")]
    NoProviderAvailable {
        /// Last provider the gateway attempted or considered
        last_tried: String,
    },
}

impl GatewayError {
    /// Wire name of this error kind
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth_error",
            Self::RateLimited { .. } => "rate_limited",
            Self::ModelNotFound { .. } => "model_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ContentFilter { .. } => "content_filter",
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
            Self::Network { .. } => "network_error",
            Self::Canceled => "canceled",
            Self::Configuration(_) => "configuration_error",
            Self::NoProviderAvailable { .. } => "no_provider_available",
        }
    }

    /// Whether the same logical request may be retried on another provider
    ///
    /// Auth, model, and request-shape failures would fail identically
    /// elsewhere (or indicate caller error) and must surface immediately.
    pub const fn is_transferable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Unavailable { .. } | Self::Network { .. }
        )
    }
}

impl From<relay_config::ResolveError> for GatewayError {
    fn from(err: relay_config::ResolveError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::ContentFilter { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout { .. } | Self::Unavailable { .. } | Self::Network { .. } | Self::NoProviderAvailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            // Client is gone; nginx convention for closed requests
            Self::Canceled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_kind(&self) -> &str {
        self.kind()
    }

    fn client_message(&self) -> String {
        match self {
            Self::Configuration(_) => "the gateway is misconfigured".to_owned(),
            other => other.to_string(),
        }
    }
}
