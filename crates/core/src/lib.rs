#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Apollo Core
//!
//! Identifiers shared by every Apollo crate.
//!
//! - [`WorkflowId`] and [`NodeId`] are author-chosen string keys. They are
//!   validated on construction and on deserialization, so a key can always be
//!   used as a segment of a state path such as `nodes.<node_id>.status`.
//! - [`ExecutionId`] is a random UUID assigned to every run.

pub mod id;
pub mod keys;

pub use id::ExecutionId;
pub use keys::{KEY_MAX_LEN, KeyError, NodeId, WorkflowId};
