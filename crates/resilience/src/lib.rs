#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Apollo Resilience
//!
//! Bounded retry with backoff, cancellation-aware waiting, and per-attempt
//! timeouts. The engine wraps every node invocation in these primitives.
//!
//! - [`RetryPolicy`] describes how many attempts to make and how long to wait
//!   between them.
//! - [`retry`] drives an async operation under a policy, observing a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) during backoff.
//! - [`timeout`] bounds a single attempt.

pub mod error;
pub mod policy;
pub mod retry;
pub mod retryable;
pub mod timeout;

pub use error::ResilienceError;
pub use policy::RetryPolicy;
pub use retry::{RetryError, RetryOutcome, retry};
pub use retryable::Retryable;
pub use timeout::timeout;
