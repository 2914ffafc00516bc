#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Apollo Log
//!
//! Subscriber setup for hosts and tests of the Apollo workflow engine.
//!
//! ```text
//! let _guard = apollo_log::init(apollo_log::Config::from_env())?;
//! ```
//!
//! Level comes from `APOLLO_LOG` (falling back to `RUST_LOG`), output format
//! from `APOLLO_LOG_FORMAT` (`pretty`, `compact`, `json`).

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard, init, init_test};
pub use config::{Config, Format};
pub use error::{LogError, LogResult};

// Re-export the macros so downstream crates need only one logging dependency.
pub use tracing::{debug, error, info, trace, warn};
