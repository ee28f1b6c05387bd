//! Error types for FixIt.

use thiserror::Error;

/// Result type alias using FixIt's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for FixIt.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Boundary Errors
    // =========================================================================
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    // =========================================================================
    // Inference Gateway Errors
    // =========================================================================
    /// Admission rejected by the local per-minute limiter. Retryable by the caller.
    #[error("Local rate limit exceeded (max {limit} requests per minute)")]
    RateLimited { limit: usize },

    /// Provider failed with a terminal error, or a transient one that
    /// survived the retry.
    #[error("Inference provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider text could not be recovered into the expected structured shape.
    #[error("Provider returned malformed output: {0}")]
    MalformedOutput(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid image error.
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a provider unavailable error.
    pub fn provider_unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    /// Create a malformed output error.
    pub fn malformed_output(msg: impl Into<String>) -> Self {
        Self::MalformedOutput(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ProviderUnavailable(_))
    }
}

/// Failure reported by an inference provider.
///
/// The gateway never inspects provider internals; it classifies these by
/// status code, the timeout flag and the provider's own message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP-like status code, when the provider reported one.
    pub status: Option<u16>,
    /// Provider error text.
    pub message: String,
    /// The call boundary gave up waiting.
    pub timed_out: bool,
}

impl ProviderError {
    /// Error with message text only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            timed_out: false,
        }
    }

    /// Error carrying a status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            timed_out: false,
        }
    }

    /// Timeout at the call boundary.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            timed_out: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::RateLimited { limit: 5 }.is_retryable());
        assert!(Error::provider_unavailable("503").is_retryable());
        assert!(!Error::malformed_output("no json").is_retryable());
        assert!(!Error::invalid_image("too small").is_retryable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::http(503, "Service Unavailable");
        assert_eq!(err.to_string(), "Service Unavailable");
        assert_eq!(err.status, Some(503));
        assert!(ProviderError::timeout("deadline").timed_out);
    }
}
