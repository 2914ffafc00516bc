//! Edge (connection) types linking workflow nodes.

use apollo_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::guard::Guard;

/// Label marking the fallback edge of a `Condition` or `Switch` node.
pub const DEFAULT_LABEL: &str = "default";
/// Label marking the edge from a `Loop` node into its body.
pub const BODY_LABEL: &str = "body";
/// Label marking the edge a `Loop` node follows once it stops iterating.
pub const EXIT_LABEL: &str = "exit";

/// A directed edge from one node to another, optionally guarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Source node.
    #[serde(rename = "from", alias = "from_node")]
    pub from_node: NodeId,
    /// Target node.
    #[serde(rename = "to", alias = "to_node")]
    pub to_node: NodeId,
    /// Predicate that must hold for the edge to be followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    /// Free-form label; `default`, `body` and `exit` carry meaning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Connection {
    /// Create an unguarded, unlabelled connection.
    #[must_use]
    pub fn new(from_node: NodeId, to_node: NodeId) -> Self {
        Self {
            from_node,
            to_node,
            guard: None,
            label: None,
        }
    }

    /// Set the guard.
    #[must_use]
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Returns `true` if source and target are the same node.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.from_node == self.to_node
    }

    /// Returns `true` if the edge carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.label.as_deref() == Some(label)
    }

    /// Fallback edge of a branching node: labelled `default`, or unguarded.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.has_label(DEFAULT_LABEL) || self.guard.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn document_form_uses_from_and_to() {
        let conn = Connection::new(id("a"), id("b")).with_label("body");
        let value = serde_json::to_value(&conn).unwrap();
        assert_eq!(value, json!({"from": "a", "to": "b", "label": "body"}));
    }

    #[test]
    fn accepts_long_endpoint_names() {
        let conn: Connection =
            serde_json::from_value(json!({"from_node": "a", "to_node": "b"})).unwrap();
        assert_eq!(conn, Connection::new(id("a"), id("b")));
    }

    #[test]
    fn default_edge_detection() {
        let plain = Connection::new(id("a"), id("b"));
        let guarded = plain.clone().with_guard(Guard::exists("x"));
        let labelled = guarded.clone().with_label(DEFAULT_LABEL);
        assert!(plain.is_default());
        assert!(!guarded.is_default());
        assert!(labelled.is_default());
    }
}
