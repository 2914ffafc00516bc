//! Execution-layer error types.

use crate::status::ExecutionStatus;

/// Failures of [`StateStore`](crate::StateStore) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Some segment of the path is absent.
    #[error("no value at path `{path}`")]
    NotFound {
        /// The path that was read.
        path: String,
    },

    /// The path is empty or has an empty segment.
    #[error("invalid state path `{path}`")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },

    /// A write would have to descend into a scalar value.
    #[error("cannot write `{path}`: `{segment}` holds a non-container value")]
    NotAContainer {
        /// The path being written.
        path: String,
        /// The segment holding the scalar.
        segment: String,
    },
}

/// Errors from execution state management.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// An invalid state transition was attempted.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// Only a terminal execution can be finished.
    #[error("cannot finish an execution that is still {status}")]
    NotTerminal {
        /// The current status.
        status: String,
    },

    /// The record was already finished and is immutable.
    #[error("execution already finished as {status}")]
    AlreadyFinished {
        /// The final status.
        status: String,
    },
}

impl ExecutionError {
    /// Build an [`ExecutionError::InvalidTransition`] for execution statuses.
    #[must_use]
    pub fn invalid_execution_transition(from: ExecutionStatus, to: ExecutionStatus) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
