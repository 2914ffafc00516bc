//! Workflow-level definition types.

use std::time::Duration;

use apollo_core::{NodeId, WorkflowId};
use apollo_resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::connection::Connection;
use crate::node::{NodeDefinition, NodeKind};

/// A complete workflow definition: nodes, edges, variables and execution policy.
///
/// Definitions are immutable once registered; the engine shares one
/// definition across any number of concurrent executions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier for this workflow.
    pub id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The nodes in this workflow.
    pub nodes: Vec<NodeDefinition>,
    /// Edges connecting the nodes, in declaration order.
    #[serde(default, rename = "edges", alias = "connections")]
    pub connections: Vec<Connection>,
    /// Workflow-level variables, seeded into state under `variables`.
    #[serde(default)]
    pub variables: Map<String, Value>,
    /// Run rollback handlers when the execution fails terminally.
    #[serde(default)]
    pub rollback_enabled: bool,
    /// Runtime configuration.
    #[serde(default)]
    pub config: WorkflowConfig,
    /// Free-form tags for filtering and grouping.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Runtime configuration shared by every node of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Default per-attempt timeout for nodes that do not declare their own.
    #[serde(
        default,
        with = "crate::serde_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_timeout: Option<Duration>,
    /// Default retry policy applied to nodes that do not declare their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowDefinition {
    /// Create an empty definition.
    #[must_use]
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            connections: Vec::new(),
            variables: Map::new(),
            rollback_enabled: false,
            config: WorkflowConfig::default(),
            tags: Vec::new(),
        }
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// All nodes of the given kind, in declaration order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// The trigger node, if there is exactly one.
    #[must_use]
    pub fn trigger(&self) -> Option<&NodeDefinition> {
        let mut triggers = self.nodes_of_kind(NodeKind::Trigger);
        match (triggers.next(), triggers.next()) {
            (Some(trigger), None) => Some(trigger),
            _ => None,
        }
    }
}
