//! Bounded retry loop for connection establishment.
//!
//! Only the connect step is retried. Once a connection is live, a failed
//! exchange is returned to the caller as-is.

use crate::error::RiapError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, retry_delay: Duration) -> Self {
        Self {
            retries,
            retry_delay,
        }
    }

    /// Total attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Progress of one logical request through the retry loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Number of attempts made.
    pub attempts_made: u32,
    /// Number of pauses taken between attempts.
    pub pauses: u32,
    /// Total time spent pausing.
    pub total_delay: Duration,
    /// Last error message if an attempt failed.
    pub last_error: Option<String>,
}

/// Run `operation` until it succeeds, fails terminally, or runs out of
/// attempts.
///
/// A retryable error (see [`RiapError::is_retryable`]) is followed by a pause
/// of `retry_delay` and another attempt, as long as attempts remain; no pause
/// follows the final attempt. When the attempts run out, the last error is
/// wrapped in [`RiapError::Retried`], even if `retries` is zero.
pub async fn retry_connect<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> (Result<T, RiapError>, RetryState)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RiapError>>,
{
    let mut state = RetryState::default();
    let max_attempts = policy.max_attempts();

    loop {
        state.attempts_made += 1;

        let err = match operation().await {
            Ok(value) => {
                if state.attempts_made > 1 {
                    debug!("Connected after {} attempts", state.attempts_made);
                }
                return (Ok(value), state);
            }
            Err(e) => e,
        };

        state.last_error = Some(err.to_string());

        if !err.is_retryable() {
            debug!("Error is not retryable: {}", err);
            return (Err(err), state);
        }

        if state.attempts_made >= max_attempts {
            warn!(
                "All {} connect attempts exhausted. Last error: {}",
                state.attempts_made, err
            );
            let attempts = state.attempts_made;
            return (
                Err(RiapError::Retried {
                    attempts,
                    source: Box::new(err),
                }),
                state,
            );
        }

        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            state.attempts_made, max_attempts, err, policy.retry_delay
        );

        state.pauses += 1;
        state.total_delay += policy.retry_delay;
        tokio::time::sleep(policy.retry_delay).await;
    }
}
