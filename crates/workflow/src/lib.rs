#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Apollo Workflow
//!
//! Workflow definition, node graph, and validation for the Apollo workflow engine.
//!
//! A workflow is a graph of typed nodes connected by directed, optionally
//! guarded edges. This crate provides:
//!
//! - [`WorkflowDefinition`] and [`WorkflowConfig`]
//! - [`NodeDefinition`] and [`NodeKind`] for individual steps, plus the typed
//!   [`NodeBehavior`] parsed from each node's `config`
//! - [`Connection`] for edges and [`Guard`] for the structured predicates on them
//! - [`DependencyGraph`] (a `petgraph` wrapper) for structural queries
//! - [`validate_workflow`] for multi-error validation and [`ValidatedWorkflow`],
//!   the only form the engine will execute
//! - [`WorkflowBuilder`] for fluent construction, including branch, parallel
//!   region and loop helpers
//! - JSON document loading and saving
//! - [`NodeState`] for tracking per-node progress

pub mod behavior;
pub mod builder;
pub mod connection;
pub mod definition;
pub mod document;
pub mod error;
pub mod graph;
pub mod guard;
pub mod node;
pub mod state;
pub mod validate;

pub use apollo_resilience::RetryPolicy;
pub use behavior::{BoundAction, LoopSpec, NodeBehavior, TransformOp};
pub use builder::WorkflowBuilder;
pub use connection::{BODY_LABEL, Connection, DEFAULT_LABEL, EXIT_LABEL};
pub use definition::{WorkflowConfig, WorkflowDefinition};
pub use error::{DocumentError, ValidationError, ValidationErrors};
pub use graph::DependencyGraph;
pub use guard::{Guard, Operator};
pub use node::{NodeDefinition, NodeKind};
pub use state::NodeState;
pub use validate::{ValidatedWorkflow, validate, validate_workflow};

/// Serde helper for `Option<Duration>` serialized as milliseconds.
pub(crate) mod serde_duration_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize an `Option<Duration>` as an optional integer of milliseconds.
    pub fn serialize<S: Serializer>(duration: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => (d.as_millis() as u64).serialize(s),
            None => s.serialize_none(),
        }
    }

    /// Deserialize an optional integer of milliseconds into `Option<Duration>`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let opt: Option<u64> = Option::deserialize(d)?;
        Ok(opt.map(Duration::from_millis))
    }
}
