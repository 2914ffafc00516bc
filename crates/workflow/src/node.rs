//! Node (step) definition within a workflow.

use std::time::Duration;

use apollo_core::NodeId;
use apollo_resilience::RetryPolicy;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::behavior::{BoundAction, TransformOp};
use crate::guard::Guard;

/// The closed set of node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point; exposes the caller's trigger payload.
    Trigger,
    /// Delegates to a named capability.
    Task,
    /// Boolean branch: follows one matching edge or the default.
    Condition,
    /// Multi-way branch by first matching guard.
    Switch,
    /// Runs every outgoing edge concurrently up to its paired merge.
    ParallelSplit,
    /// Barrier joining the branches of a parallel split.
    Merge,
    /// Repeats a body while a guard holds, up to an iteration cap.
    Loop,
    /// Pure declarative data reshape.
    Transform,
    /// Suspends the current branch.
    Delay,
    /// Recovery or rollback step; only reached through another node's handler reference.
    ErrorHandler,
}

impl NodeKind {
    /// Kinds that dispatch to a capability and so require `capability_name`.
    #[must_use]
    pub fn requires_capability(&self) -> bool {
        matches!(self, Self::Task | Self::ErrorHandler)
    }

    /// Kinds that select at most one outgoing edge.
    #[must_use]
    pub fn is_branching(&self) -> bool {
        matches!(self, Self::Condition | Self::Switch)
    }

    /// Kinds whose failures go through the retry policy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Task | Self::Delay)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trigger => "trigger",
            Self::Task => "task",
            Self::Condition => "condition",
            Self::Switch => "switch",
            Self::ParallelSplit => "parallel_split",
            Self::Merge => "merge",
            Self::Loop => "loop",
            Self::Transform => "transform",
            Self::Delay => "delay",
            Self::ErrorHandler => "error_handler",
        };
        f.write_str(name)
    }
}

/// A single step inside a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node identifier within this workflow.
    pub id: NodeId,
    /// What the node does.
    pub kind: NodeKind,
    /// Kind-specific settings, parsed into a
    /// [`NodeBehavior`](crate::NodeBehavior) during validation.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    /// Capability invoked by `task` and `error_handler` nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_name: Option<String>,
    /// Local input name → state path to read.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub input_mapping: IndexMap<String, String>,
    /// State path to write → field name in the node's result.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub output_mapping: IndexMap<String, String>,
    /// Per-attempt timeout (overrides the workflow and engine defaults).
    #[serde(
        default,
        with = "crate::serde_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    /// Shorthand overriding only the attempt budget of the effective retry policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Node-level retry policy (overrides the workflow default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// Node run after this one exhausts its retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handler_id: Option<NodeId>,
    /// Node run when a later failure triggers rollback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_handler_id: Option<NodeId>,
}

impl NodeDefinition {
    /// Create a bare node of the given kind.
    #[must_use]
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            config: Map::new(),
            capability_name: None,
            input_mapping: IndexMap::new(),
            output_mapping: IndexMap::new(),
            timeout: None,
            max_attempts: None,
            retry_policy: None,
            error_handler_id: None,
            rollback_handler_id: None,
        }
    }

    /// The workflow's entry node.
    #[must_use]
    pub fn trigger(id: NodeId) -> Self {
        Self::new(id, NodeKind::Trigger)
    }

    /// A node delegating to `capability`.
    #[must_use]
    pub fn task(id: NodeId, capability: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Task).with_capability(capability)
    }

    /// A boolean branch.
    #[must_use]
    pub fn condition(id: NodeId) -> Self {
        Self::new(id, NodeKind::Condition)
    }

    /// A multi-way branch.
    #[must_use]
    pub fn switch(id: NodeId) -> Self {
        Self::new(id, NodeKind::Switch)
    }

    /// A parallel split joined at `merge`.
    #[must_use]
    pub fn parallel_split(id: NodeId, merge: &NodeId) -> Self {
        Self::new(id, NodeKind::ParallelSplit).with_config("merge", merge.as_str())
    }

    /// A join barrier.
    #[must_use]
    pub fn merge(id: NodeId) -> Self {
        Self::new(id, NodeKind::Merge)
    }

    /// A loop repeating its body while `guard` holds, at most `max_iterations` times.
    #[must_use]
    pub fn loop_node(id: NodeId, guard: Guard, max_iterations: u32) -> Self {
        Self::new(id, NodeKind::Loop)
            .with_config("guard", json!(guard))
            .with_config("max_iterations", max_iterations)
    }

    /// A pure data reshape.
    #[must_use]
    pub fn transform(id: NodeId, operations: Vec<TransformOp>) -> Self {
        Self::new(id, NodeKind::Transform).with_config("operations", json!(operations))
    }

    /// A branch-local pause.
    #[must_use]
    pub fn delay(id: NodeId, duration: Duration) -> Self {
        Self::new(id, NodeKind::Delay).with_config("duration_ms", duration.as_millis() as u64)
    }

    /// A recovery or rollback step backed by `capability`.
    #[must_use]
    pub fn error_handler(id: NodeId, capability: impl Into<String>) -> Self {
        Self::new(id, NodeKind::ErrorHandler).with_capability(capability)
    }

    /// Set a `config` entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Set the capability name.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability_name = Some(capability.into());
        self
    }

    /// Map local input `name` from state `path`.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.input_mapping.insert(name.into(), path.into());
        self
    }

    /// Write result `field` to state `path` after success.
    #[must_use]
    pub fn with_output(mut self, path: impl Into<String>, field: impl Into<String>) -> Self {
        self.output_mapping.insert(path.into(), field.into());
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set a node-level retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Set the error handler.
    #[must_use]
    pub fn with_error_handler(mut self, handler: NodeId) -> Self {
        self.error_handler_id = Some(handler);
        self
    }

    /// Set the rollback handler.
    #[must_use]
    pub fn with_rollback_handler(mut self, handler: NodeId) -> Self {
        self.rollback_handler_id = Some(handler);
        self
    }

    /// Make a loop node fail instead of exiting when its cap is reached.
    #[must_use]
    pub fn fail_on_bound(self) -> Self {
        self.with_config("on_bound", json!(BoundAction::Fail))
    }

    /// Resolve the retry policy for this node: node policy, else the
    /// workflow-level `fallback`, with `max_attempts` applied on top.
    #[must_use]
    pub fn effective_retry(&self, fallback: &RetryPolicy) -> RetryPolicy {
        let policy = self.retry_policy.clone().unwrap_or_else(|| fallback.clone());
        match self.max_attempts {
            Some(n) => policy.with_max_attempts(n),
            None => policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn minimal_document_deserializes() {
        let node: NodeDefinition = serde_json::from_value(json!({
            "id": "fetch",
            "kind": "task",
            "capability_name": "http.get",
            "input_mapping": {"url": "trigger.url"},
            "timeout": 1500
        }))
        .unwrap();

        assert_eq!(node.kind, NodeKind::Task);
        assert_eq!(node.capability_name.as_deref(), Some("http.get"));
        assert_eq!(node.input_mapping["url"], "trigger.url");
        assert_eq!(node.timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn max_attempts_overrides_fallback_policy() {
        let node = NodeDefinition::task(id("t"), "cap").with_max_attempts(7);
        let policy = node.effective_retry(&RetryPolicy::fixed(2, 10));
        assert_eq!(policy, RetryPolicy::fixed(7, 10));
    }

    #[test]
    fn node_policy_wins_over_fallback() {
        let node = NodeDefinition::task(id("t"), "cap").with_retry_policy(RetryPolicy::none());
        assert_eq!(
            node.effective_retry(&RetryPolicy::default()),
            RetryPolicy::none()
        );
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(NodeKind::ParallelSplit).unwrap(),
            json!("parallel_split")
        );
        assert_eq!(NodeKind::ErrorHandler.to_string(), "error_handler");
    }
}
