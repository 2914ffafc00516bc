//! Resilience error types.

use std::time::Duration;

/// Errors produced by the resilience primitives themselves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResilienceError {
    /// An operation did not finish within its time budget.
    #[error("operation timed out after {duration:?}")]
    Timeout {
        /// The budget that was exceeded.
        duration: Duration,
    },

    /// A retry policy failed validation.
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl ResilienceError {
    /// Create a timeout error.
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Returns `true` if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
