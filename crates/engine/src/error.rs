//! Engine error types.

use std::time::Duration;

use apollo_core::{NodeId, WorkflowId};
use apollo_execution::{ErrorKind, ExecutionFailure, StoreError};
use apollo_resilience::Retryable;
use apollo_workflow::ValidationErrors;

/// Errors from the engine layer.
///
/// Node failures never surface here; they end up in the
/// [`ExecutionRecord`](apollo_execution::ExecutionRecord).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No workflow is registered under this id.
    #[error("workflow not found: {workflow_id}")]
    WorkflowNotFound {
        /// The requested workflow.
        workflow_id: WorkflowId,
    },

    /// The definition failed validation.
    #[error("invalid workflow: {0}")]
    Validation(#[from] ValidationErrors),

    /// Engine configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// A spawned execution task panicked.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Failure reported by a capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    /// A transient failure; the engine may retry.
    #[error("{0}")]
    Retryable(String),

    /// A permanent failure; retrying will not help.
    #[error("{0}")]
    Fatal(String),
}

impl CapabilityError {
    /// A transient failure.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    /// A permanent failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// Runtime failure of a single node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    /// The node's capability is not registered.
    #[error("node {node_id}: capability `{capability}` not found")]
    CapabilityNotFound {
        /// The failing node.
        node_id: NodeId,
        /// The unresolved capability name.
        capability: String,
    },

    /// An attempt ran longer than the node timeout.
    #[error("node {node_id} timed out after {timeout:?}")]
    Timeout {
        /// The failing node.
        node_id: NodeId,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The capability reported a failure.
    #[error("node {node_id} failed: {source}")]
    Execution {
        /// The failing node.
        node_id: NodeId,
        /// What the capability reported.
        source: CapabilityError,
    },

    /// A loop configured to fail hit its iteration cap.
    #[error("loop {node_id} still running after {max_iterations} iterations")]
    LoopBoundExceeded {
        /// The loop node.
        node_id: NodeId,
        /// The configured cap.
        max_iterations: u32,
    },

    /// The node's result could not be written to state.
    #[error("node {node_id}: cannot write result: {source}")]
    StateWrite {
        /// The failing node.
        node_id: NodeId,
        /// The store failure.
        source: StoreError,
    },

    /// A rollback handler failed.
    #[error("rollback of {node_id} via {handler_id} failed: {message}")]
    RollbackHandler {
        /// The node being compensated.
        node_id: NodeId,
        /// The handler that failed.
        handler_id: NodeId,
        /// Handler error.
        message: String,
    },

    /// The execution was cancelled.
    #[error("node {node_id}: execution cancelled")]
    Cancelled {
        /// The node that observed cancellation.
        node_id: NodeId,
    },
}

impl NodeError {
    /// The node the error belongs to.
    #[must_use]
    pub fn node_id(&self) -> &NodeId {
        match self {
            Self::CapabilityNotFound { node_id, .. }
            | Self::Timeout { node_id, .. }
            | Self::Execution { node_id, .. }
            | Self::LoopBoundExceeded { node_id, .. }
            | Self::StateWrite { node_id, .. }
            | Self::RollbackHandler { node_id, .. }
            | Self::Cancelled { node_id } => node_id,
        }
    }

    /// Record category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityNotFound { .. } => ErrorKind::CapabilityNotFound,
            Self::Timeout { .. } => ErrorKind::NodeTimeout,
            Self::Execution { .. } => ErrorKind::NodeExecution,
            Self::LoopBoundExceeded { .. } => ErrorKind::LoopBoundExceeded,
            Self::StateWrite { .. } => ErrorKind::StateWrite,
            Self::RollbackHandler { .. } => ErrorKind::RollbackHandler,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns `true` for cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Convert into the failure stored on the execution record.
    #[must_use]
    pub fn to_failure(&self) -> ExecutionFailure {
        ExecutionFailure {
            node_id: self.node_id().clone(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl Retryable for NodeError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Execution { source, .. } => matches!(source, CapabilityError::Retryable(_)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn node() -> NodeId {
        NodeId::new("fetch").unwrap()
    }

    #[test]
    fn workflow_not_found_display() {
        let err = EngineError::WorkflowNotFound {
            workflow_id: WorkflowId::new("onboarding").unwrap(),
        };
        assert_eq!(err.to_string(), "workflow not found: onboarding");
    }

    #[rstest]
    #[case(NodeError::Timeout { node_id: node(), timeout: Duration::from_millis(5) }, true)]
    #[case(NodeError::Execution { node_id: node(), source: CapabilityError::retryable("503") }, true)]
    #[case(NodeError::Execution { node_id: node(), source: CapabilityError::fatal("bad input") }, false)]
    #[case(NodeError::CapabilityNotFound { node_id: node(), capability: "x".into() }, false)]
    #[case(NodeError::Cancelled { node_id: node() }, false)]
    fn retryability(#[case] err: NodeError, #[case] retryable: bool) {
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn failure_carries_node_and_kind() {
        let err = NodeError::LoopBoundExceeded {
            node_id: node(),
            max_iterations: 3,
        };
        let failure = err.to_failure();
        assert_eq!(failure.node_id, node());
        assert_eq!(failure.kind, ErrorKind::LoopBoundExceeded);
        assert!(failure.message.contains("3 iterations"));
    }
}
