//! Stub server error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while starting or driving an [`HttpStub`](crate::HttpStub).
#[derive(Error, Debug)]
pub enum StubError {
    /// Every bind attempt failed.
    #[error("failed to bind a listener after {attempts} attempts (last port {last_port}): {source}")]
    BindExhausted {
        /// Number of ports tried.
        attempts: usize,
        /// The port tried on the final attempt.
        last_port: u16,
        /// The error returned by the final attempt.
        #[source]
        source: std::io::Error,
    },

    /// The completion threshold was zero.
    #[error("complete request count must be at least 1")]
    InvalidRequestCount,

    /// The stub configuration cannot be used.
    #[error("invalid stub configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// I/O error from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout occurred.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long the operation waited.
        duration: Duration,
    },
}

impl StubError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns `true` if this error came from port binding.
    #[must_use]
    pub const fn is_bind_error(&self) -> bool {
        matches!(self, Self::BindExhausted { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StubError>;
