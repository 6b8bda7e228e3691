//! Error handling for the limiter
//!
//! This module defines all error types surfaced by the crate.

use thiserror::Error;

/// Result type alias for the limiter
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Main error type for the limiter
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis errors (connectivity, timeouts, protocol)
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A blocking wait was cancelled before admission succeeded
    #[error("Wait cancelled before admission")]
    Cancelled,
}

impl LimiterError {
    /// Whether the error came from the coordination store rather than the
    /// caller's own input. Transport errors are usually worth retrying.
    pub fn is_transport(&self) -> bool {
        matches!(self, LimiterError::Redis(_))
    }
}
