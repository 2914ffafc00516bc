//! Workflow-specific error types.

use std::fmt;
use std::path::PathBuf;

use apollo_core::NodeId;
use thiserror::Error;

/// A single problem found while validating a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Workflow name must not be empty.
    #[error("workflow name must not be empty")]
    EmptyName,

    /// Workflow must have at least one node.
    #[error("workflow must have at least one node")]
    NoNodes,

    /// Duplicate node id found.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(NodeId),

    /// Connection references a node that does not exist.
    #[error("connection references unknown node: {0}")]
    UnknownNode(NodeId),

    /// A connection has the same source and target node.
    #[error("self-loop detected on node: {0}")]
    SelfLoop(NodeId),

    /// No node of kind `trigger`.
    #[error("workflow has no trigger node")]
    MissingTrigger,

    /// More than one node of kind `trigger`.
    #[error("workflow has {count} trigger nodes, expected exactly one")]
    MultipleTriggers {
        /// Number of trigger nodes found.
        count: usize,
    },

    /// The trigger node is the target of an edge.
    #[error("trigger node {0} has incoming edges")]
    TriggerHasIncomingEdges(NodeId),

    /// A `task` or `error_handler` node without a capability name.
    #[error("node {0} requires a non-empty capability_name")]
    MissingCapability(NodeId),

    /// A node's `config` does not match its kind.
    #[error("node {node_id} has invalid config: {message}")]
    InvalidConfig {
        /// The misconfigured node.
        node_id: NodeId,
        /// What is wrong.
        message: String,
    },

    /// A node or workflow retry policy is unusable.
    #[error("invalid retry policy{}: {message}", node_suffix(.node_id.as_ref()))]
    InvalidRetryPolicy {
        /// The node carrying the policy, or `None` for the workflow default.
        node_id: Option<NodeId>,
        /// What is wrong.
        message: String,
    },

    /// A mapping or guard refers to an empty state path or path segment.
    #[error("node {node_id} uses malformed state path {path:?}")]
    InvalidPath {
        /// The node owning the mapping or outgoing guard.
        node_id: NodeId,
        /// The offending path.
        path: String,
    },

    /// A loop node has no outgoing `body` edge, or more than one.
    #[error("loop node {node_id} must have exactly one `body` edge, found {found}")]
    LoopBody {
        /// The loop node.
        node_id: NodeId,
        /// Number of `body` edges.
        found: usize,
    },

    /// A loop node has an outgoing edge labelled neither `body` nor `exit`,
    /// or more than one `exit` edge.
    #[error("loop node {0} may only have one `body` and at most one `exit` edge")]
    LoopEdges(NodeId),

    /// A parallel split names a merge that does not exist or is not a merge node.
    #[error("parallel split {split} references {merge}, which is not a merge node")]
    InvalidMergeReference {
        /// The split node.
        split: NodeId,
        /// The referenced node.
        merge: NodeId,
    },

    /// Two parallel splits name the same merge.
    #[error("merge node {0} is paired with more than one parallel split")]
    MergePairedTwice(NodeId),

    /// A handler reference names a missing node.
    #[error("node {node_id} references unknown handler {handler_id}")]
    UnknownHandler {
        /// The node carrying the reference.
        node_id: NodeId,
        /// The missing handler.
        handler_id: NodeId,
    },

    /// A handler reference names a node that is not an `error_handler`.
    #[error("node {node_id} references handler {handler_id}, which is not an error_handler node")]
    HandlerWrongKind {
        /// The node carrying the reference.
        node_id: NodeId,
        /// The referenced node.
        handler_id: NodeId,
    },

    /// An `error_handler` node is the target of a normal edge.
    #[error("error handler {0} must not be the target of an edge")]
    HandlerReachable(NodeId),

    /// A condition node has more than two outgoing edges.
    #[error("condition node {0} has more than two outgoing edges")]
    ConditionFanOut(NodeId),

    /// A branching node has more than one default edge.
    #[error("branching node {0} has more than one default edge")]
    AmbiguousDefault(NodeId),

    /// The graph contains a cycle that does not pass through a loop node.
    #[error("cycle detected through node {0} that does not pass through a loop node")]
    CycleDetected(NodeId),
}

fn node_suffix(node_id: Option<&NodeId>) -> String {
    node_id.map(|id| format!(" on node {id}")).unwrap_or_default()
}

/// Every problem found in one definition. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Wrap a list of problems, returning `None` when there are none.
    #[must_use]
    pub fn from_vec(errors: Vec<ValidationError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    /// Wrap a single problem.
    #[must_use]
    pub fn single(error: ValidationError) -> Self {
        Self(vec![error])
    }

    /// The individual problems, in discovery order.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    /// Returns `true` if any problem matches `predicate`.
    pub fn any(&self, predicate: impl FnMut(&ValidationError) -> bool) -> bool {
        self.0.iter().any(predicate)
    }

    /// Number of problems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workflow validation failed with {} error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Failure to load or save a workflow document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document is not a well-formed workflow.
    #[error("invalid workflow document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Reading or writing the file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
