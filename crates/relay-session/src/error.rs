use thiserror::Error;

/// Session store failures
#[derive(Debug, Error)]
pub enum SessionError {
    /// State blob could not be serialized or deserialized
    #[error("session serialization error: {0}")]
    Serialization(String),

    /// Redis operation failed
    #[error("session store error: {0}")]
    Redis(String),

    /// Store operation exceeded its bounded timeout
    #[error("session store operation timed out")]
    Timeout,

    /// Invalid store configuration
    #[error("session store configuration error: {0}")]
    Config(String),
}
