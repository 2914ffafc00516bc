#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Apollo Execution
//!
//! Per-run data structures for the Apollo workflow engine:
//!
//! - [`StateStore`]: the path-addressable data bus nodes read from and write to
//! - [`evaluate`]: the side-effect-free guard evaluator
//! - [`ExecutionStatus`] and the transition rules in [`transition`]
//! - [`ExecutionRecord`], [`NodeResult`] and the [`JournalEntry`] audit log

pub mod condition;
pub mod error;
pub mod journal;
pub mod record;
pub mod status;
pub mod store;
pub mod transition;

pub use condition::evaluate;
pub use error::{ExecutionError, StoreError};
pub use journal::JournalEntry;
pub use record::{ErrorKind, ExecutionFailure, ExecutionRecord, NodeResult, RollbackStep};
pub use status::ExecutionStatus;
pub use store::StateStore;
pub use transition::{can_transition_execution, can_transition_node};
