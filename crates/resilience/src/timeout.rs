//! Time-bounded execution of a single future.

use std::future::Future;
use std::time::Duration;

use crate::ResilienceError;

/// Execute a future with a timeout.
///
/// Returns [`ResilienceError::Timeout`] if `future` has not completed after
/// `duration`. The future is dropped on timeout.
pub async fn timeout<T, F>(duration: Duration, future: F) -> Result<T, ResilienceError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ResilienceError::timeout(duration))
}
