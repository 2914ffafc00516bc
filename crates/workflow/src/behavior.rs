//! Typed interpretation of a node's `config` map.
//!
//! `config` is stored as an opaque JSON object so documents stay forward
//! compatible; validation parses it into a [`NodeBehavior`] once, and the
//! engine only ever sees the typed form.

use std::time::Duration;

use apollo_core::NodeId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::guard::Guard;
use crate::node::{NodeDefinition, NodeKind};

/// What a loop does when it reaches `max_iterations` with its guard still true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundAction {
    /// Leave through the exit edge.
    #[default]
    Exit,
    /// Fail the loop node.
    Fail,
}

/// Parsed configuration of a `loop` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpec {
    /// Re-evaluated before every iteration; the body runs while it holds.
    pub guard: Guard,
    /// Hard cap on body iterations, at least 1.
    pub max_iterations: u32,
    /// Behaviour at the cap.
    #[serde(default, alias = "on_bound_exceeded")]
    pub on_bound: BoundAction,
}

/// One step of a `transform` node. Operations apply in order to a result map
/// that starts empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// Copy the value at state path `from` into result field `to`
    /// (`null` when the path is absent).
    Copy {
        /// State path to read.
        from: String,
        /// Result field to write.
        to: String,
    },
    /// Set result field `field` to a literal.
    Set {
        /// Result field to write.
        field: String,
        /// The literal.
        value: Value,
    },
    /// Push `value` onto the array in result field `field`, creating it if absent.
    Append {
        /// Result field holding an array.
        field: String,
        /// Element to push.
        value: Value,
    },
    /// Remove result field `field`.
    Remove {
        /// Result field to drop.
        field: String,
    },
    /// Write the length of the array, object or string at state path `from`
    /// into result field `to` (`0` when absent).
    Count {
        /// State path to measure.
        from: String,
        /// Result field to write.
        to: String,
    },
}

/// Typed, validated per-kind behaviour of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeBehavior {
    /// Entry node.
    Trigger,
    /// Capability call.
    Task,
    /// Boolean branch.
    Condition,
    /// Multi-way branch.
    Switch,
    /// Parallel region opener.
    ParallelSplit {
        /// The paired join node.
        merge: NodeId,
    },
    /// Join barrier.
    Merge,
    /// Bounded repetition.
    Loop(LoopSpec),
    /// Declarative reshape.
    Transform(Vec<TransformOp>),
    /// Branch-local pause.
    Delay {
        /// How long to suspend.
        duration: Duration,
    },
    /// Handler invoked by failure or rollback paths.
    ErrorHandler,
}

#[derive(Deserialize)]
struct SplitConfig {
    merge: NodeId,
}

#[derive(Deserialize)]
struct DelayConfig {
    duration_ms: u64,
}

#[derive(Deserialize)]
struct TransformConfig {
    #[serde(default)]
    operations: Vec<TransformOp>,
}

fn parse<T: DeserializeOwned>(config: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(config.clone())).map_err(|e| e.to_string())
}

impl NodeBehavior {
    /// Parse a node's `config` according to its kind.
    ///
    /// Returns a human-readable message describing the first problem.
    pub fn from_node(node: &NodeDefinition) -> Result<Self, String> {
        let behavior = match node.kind {
            NodeKind::Trigger => Self::Trigger,
            NodeKind::Task => Self::Task,
            NodeKind::Condition => Self::Condition,
            NodeKind::Switch => Self::Switch,
            NodeKind::Merge => Self::Merge,
            NodeKind::ErrorHandler => Self::ErrorHandler,
            NodeKind::ParallelSplit => {
                let SplitConfig { merge } = parse(&node.config)?;
                Self::ParallelSplit { merge }
            }
            NodeKind::Loop => {
                let spec: LoopSpec = parse(&node.config)?;
                if spec.max_iterations == 0 {
                    return Err("max_iterations must be at least 1".into());
                }
                if spec.guard.field.trim().is_empty() {
                    return Err("loop guard field must not be empty".into());
                }
                Self::Loop(spec)
            }
            NodeKind::Transform => {
                let TransformConfig { operations } = parse(&node.config)?;
                Self::Transform(operations)
            }
            NodeKind::Delay => {
                let DelayConfig { duration_ms } = parse(&node.config)?;
                Self::Delay {
                    duration: Duration::from_millis(duration_ms),
                }
            }
        };
        Ok(behavior)
    }

    /// The kind this behaviour was parsed for.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Trigger => NodeKind::Trigger,
            Self::Task => NodeKind::Task,
            Self::Condition => NodeKind::Condition,
            Self::Switch => NodeKind::Switch,
            Self::ParallelSplit { .. } => NodeKind::ParallelSplit,
            Self::Merge => NodeKind::Merge,
            Self::Loop(_) => NodeKind::Loop,
            Self::Transform(_) => NodeKind::Transform,
            Self::Delay { .. } => NodeKind::Delay,
            Self::ErrorHandler => NodeKind::ErrorHandler,
        }
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
    fn loop_config_parses_with_default_bound_action() {
        let node = NodeDefinition::loop_node(id("l"), Guard::less_than("x", 3), 5);
        let behavior = NodeBehavior::from_node(&node).unwrap();
        assert_eq!(
            behavior,
            NodeBehavior::Loop(LoopSpec {
                guard: Guard::less_than("x", 3),
                max_iterations: 5,
                on_bound: BoundAction::Exit,
            })
        );
    }

    #[test]
    fn loop_requires_bound() {
        let node = NodeDefinition::new(id("l"), NodeKind::Loop)
            .with_config("guard", json!({"field": "x", "operator": "exists"}));
        let err = NodeBehavior::from_node(&node).unwrap_err();
        assert!(err.contains("max_iterations"), "{err}");
    }

    #[test]
    fn loop_rejects_zero_bound() {
        let node = NodeDefinition::loop_node(id("l"), Guard::exists("x"), 0);
        assert!(NodeBehavior::from_node(&node).is_err());
    }

    #[test]
    fn fail_on_bound_is_recorded() {
        let node = NodeDefinition::loop_node(id("l"), Guard::exists("x"), 2).fail_on_bound();
        match NodeBehavior::from_node(&node).unwrap() {
            NodeBehavior::Loop(spec) => assert_eq!(spec.on_bound, BoundAction::Fail),
            other => panic!("unexpected behaviour {other:?}"),
        }
    }

    #[test]
    fn split_requires_merge_reference() {
        let node = NodeDefinition::new(id("s"), NodeKind::ParallelSplit);
        assert!(NodeBehavior::from_node(&node).is_err());

        let node = NodeDefinition::parallel_split(id("s"), &id("m"));
        assert_eq!(
            NodeBehavior::from_node(&node).unwrap(),
            NodeBehavior::ParallelSplit { merge: id("m") }
        );
    }

    #[test]
    fn transform_operations_parse_in_order() {
        let node = NodeDefinition::new(id("t"), NodeKind::Transform).with_config(
            "operations",
            json!([
                {"op": "copy", "from": "trigger.name", "to": "name"},
                {"op": "set", "field": "source", "value": "web"},
                {"op": "append", "field": "tags", "value": "new"},
                {"op": "remove", "field": "source"},
                {"op": "count", "from": "trigger.items", "to": "item_count"}
            ]),
        );
        let NodeBehavior::Transform(ops) = NodeBehavior::from_node(&node).unwrap() else {
            panic!("expected transform");
        };
        assert_eq!(ops.len(), 5);
        assert_eq!(
            ops[0],
            TransformOp::Copy {
                from: "trigger.name".into(),
                to: "name".into()
            }
        );
    }

    #[test]
    fn unknown_transform_op_is_rejected() {
        let node = NodeDefinition::new(id("t"), NodeKind::Transform)
            .with_config("operations", json!([{"op": "eval", "code": "1+1"}]));
        assert!(NodeBehavior::from_node(&node).is_err());
    }

    #[test]
    fn delay_duration_in_millis() {
        let node = NodeDefinition::delay(id("d"), Duration::from_millis(250));
        assert_eq!(
            NodeBehavior::from_node(&node).unwrap(),
            NodeBehavior::Delay {
                duration: Duration::from_millis(250)
            }
        );
    }
}
