//! Classification of errors for retry decisions.

/// Errors that can tell the retry loop whether another attempt is worthwhile.
///
/// The default treats every error as transient.
pub trait Retryable {
    /// Check if this error can be retried.
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for crate::ResilienceError {
    fn is_retryable(&self) -> bool {
        self.is_timeout()
    }
}

impl Retryable for std::io::Error {
    fn is_retryable(&self) -> bool {
        use std::io::ErrorKind::{
            ConnectionAborted, ConnectionReset, Interrupted, TimedOut, WouldBlock,
        };
        matches!(
            self.kind(),
            Interrupted | WouldBlock | TimedOut | ConnectionReset | ConnectionAborted
        )
    }
}
