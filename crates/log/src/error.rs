//! Logging setup errors.

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level directive could not be parsed.
    #[error("invalid filter `{directive}`: {message}")]
    Filter {
        /// The rejected directive.
        directive: String,
        /// Parser detail.
        message: String,
    },

    /// A global subscriber is already installed.
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Result alias for logging setup.
pub type LogResult<T> = Result<T, LogError>;
