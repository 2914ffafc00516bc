#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Apollo Engine
//!
//! Graph-based workflow execution engine.
//!
//! A [`WorkflowEngine`] validates and registers
//! [`WorkflowDefinition`](apollo_workflow::WorkflowDefinition)s, then runs
//! them against a shared [`CapabilityRegistry`]. Each run walks the node graph
//! from its single trigger, mapping state paths into and out of every node,
//! following guarded edges, fanning out across parallel regions, repeating
//! bounded loops, retrying failed attempts, and rolling back on terminal
//! failure. Every run ends in an
//! [`ExecutionRecord`](apollo_execution::ExecutionRecord).
//!
//! ```text
//! let registry = Arc::new(CapabilityRegistry::new());
//! registry.register_fn("crm.lookup", |input| async move { Ok(input) });
//!
//! let engine = WorkflowEngine::new(registry);
//! let id = engine.validate_and_register(definition)?;
//! let record = engine.execute(&id, json!({"email": "a@b.c"}), json!({})).await?;
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod stats;

mod run;
mod transform;

pub use capability::{Capability, CapabilityMap, CapabilityRegistry, FnCapability, capability_fn};
pub use config::EngineConfig;
pub use engine::{WorkflowEngine, WorkflowSummary};
pub use error::{CapabilityError, EngineError, NodeError};
pub use handle::ExecutionHandle;
pub use stats::WorkflowStatistics;
