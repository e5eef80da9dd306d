use thiserror::Error;

/// Rate limiter failures
///
/// Store failures degrade to the in-memory fallback rather than denying
/// traffic, so these errors stay internal to the crate's admission path.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Invalid limiter configuration
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Redis store failure
    #[error("rate limit store error: {0}")]
    Redis(String),
}
