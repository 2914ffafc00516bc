//! Execution journal for audit.

use apollo_core::{NodeId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::ExecutionStatus;

/// A journal entry recording a significant event during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEntry {
    /// The execution was started.
    ExecutionStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The workflow being run.
        workflow_id: WorkflowId,
    },

    /// A node started an attempt.
    NodeStarted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that started.
        node_id: NodeId,
        /// Which attempt number (1-indexed).
        attempt: u32,
    },

    /// A node attempt failed and another is scheduled.
    NodeRetrying {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node being retried.
        node_id: NodeId,
        /// The attempt that failed (1-indexed).
        attempt: u32,
        /// Backoff before the next attempt, in milliseconds.
        delay_ms: u64,
        /// Why the attempt failed.
        error: String,
    },

    /// A node completed successfully.
    NodeCompleted {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that completed.
        node_id: NodeId,
        /// Attempts it took.
        attempts: u32,
    },

    /// A node failed terminally.
    NodeFailed {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that failed.
        node_id: NodeId,
        /// Error message.
        error: String,
    },

    /// A failed node's error handler succeeded and the branch recovered.
    ErrorHandled {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node that failed.
        node_id: NodeId,
        /// The handler that recovered it.
        handler_id: NodeId,
    },

    /// All branches of a parallel split reached its merge.
    BranchesJoined {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The split node.
        split_id: NodeId,
        /// The merge node.
        merge_id: NodeId,
        /// Number of branches joined.
        branches: usize,
    },

    /// A loop began an iteration of its body.
    LoopIteration {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The loop node.
        node_id: NodeId,
        /// Zero-based iteration index.
        iteration: u32,
    },

    /// A rollback handler ran.
    RollbackStep {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The node being compensated.
        node_id: NodeId,
        /// The handler invoked.
        handler_id: NodeId,
        /// Whether the handler succeeded.
        success: bool,
    },

    /// The execution reached a terminal status.
    ExecutionFinished {
        /// When the event occurred.
        timestamp: DateTime<Utc>,
        /// The terminal status.
        status: ExecutionStatus,
    },
}

impl JournalEntry {
    /// When the event occurred.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ExecutionStarted { timestamp, .. }
            | Self::NodeStarted { timestamp, .. }
            | Self::NodeRetrying { timestamp, .. }
            | Self::NodeCompleted { timestamp, .. }
            | Self::NodeFailed { timestamp, .. }
            | Self::ErrorHandled { timestamp, .. }
            | Self::BranchesJoined { timestamp, .. }
            | Self::LoopIteration { timestamp, .. }
            | Self::RollbackStep { timestamp, .. }
            | Self::ExecutionFinished { timestamp, .. } => *timestamp,
        }
    }

    /// The node the event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeRetrying { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::ErrorHandled { node_id, .. }
            | Self::LoopIteration { node_id, .. }
            | Self::RollbackStep { node_id, .. } => Some(node_id),
            Self::BranchesJoined { merge_id, .. } => Some(merge_id),
            Self::ExecutionStarted { .. } | Self::ExecutionFinished { .. } => None,
        }
    }
}
