//! Bounded retry loop that honours cancellation while backing off.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::policy::RetryPolicy;
use crate::retryable::Retryable;

/// A successful value together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    /// The value produced by the last attempt.
    pub value: T,
    /// Total attempts made, including the successful one.
    pub attempts: u32,
}

/// Why the retry loop stopped without a value.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt the policy allows failed.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: E,
    },

    /// An attempt failed with an error that must not be retried.
    #[error("attempt {attempts} failed permanently: {error}")]
    Aborted {
        /// Attempts made, including the failing one.
        attempts: u32,
        /// The non-retryable error.
        error: E,
    },

    /// The cancellation token fired before an attempt or during a backoff wait.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts made before cancellation was observed.
        attempts: u32,
        /// Error from the last attempt, if any attempt ran.
        last: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Attempts made before the loop stopped.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Aborted { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Returns `true` if the loop stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The last error an attempt produced, if any.
    #[must_use]
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { last, .. } => Some(last),
            Self::Aborted { error, .. } => Some(error),
            Self::Cancelled { last, .. } => last,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, exhausts
/// `policy.max_attempts`, or `cancel` fires.
///
/// `operation` receives the 1-based attempt number. `on_retry` is called
/// with the failed attempt number, its error, and the delay about to be
/// slept, before each backoff wait.
pub async fn retry<T, E, F, Fut, H>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    mut on_retry: H,
) -> Result<RetryOutcome<T>, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable,
    H: FnMut(u32, &E, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled {
                attempts: attempt,
                last: None,
            });
        }
        attempt += 1;

        let error = match operation(attempt).await {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(RetryError::Aborted {
                attempts: attempt,
                error,
            });
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: error,
            });
        }

        let delay = policy.delay_for_attempt(attempt - 1);
        tracing::debug!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, "scheduling retry");
        on_retry(attempt, &error, delay);

        tokio::select! {
            () = cancel.cancelled() => {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last: Some(error),
                });
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}
