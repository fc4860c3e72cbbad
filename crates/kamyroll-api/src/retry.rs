// Bounded retry loop around backend calls.
//
// The backend tells us how long to back off through its error code, so each
// failed attempt carries its own delay instead of a computed backoff curve.

use crate::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How often and how long to wait between backend calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Delay after a transient connection/initialisation error.
    pub transient_delay: Duration,
    /// Delay after any other retryable error.
    pub default_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient_delay: Duration::from_millis(2000),
            default_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Outcome of a single attempt.
pub enum RetryAction<T> {
    Success(T),
    /// Failed, try again after `delay`.
    Retry { error: ApiError, delay: Duration },
    /// Failed for good.
    Fail(ApiError),
}

/// Run `operation` until it succeeds, fails permanently or attempts run out.
///
/// `operation` receives the 0-based attempt number. Every wait is raced
/// against `token`; a cancelled token ends the loop with [`ApiError::Cancelled`].
/// On exhaustion the error of the last attempt is returned.
pub async fn retry_with_delay<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, ApiError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let attempts = policy.attempts();
    let mut last_error = None;

    for attempt in 0..attempts {
        if token.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry { error, delay } => {
                if attempt + 1 >= attempts {
                    last_error = Some(error);
                    break;
                }
                warn!(
                    attempt = attempt + 1,
                    max = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying API call"
                );
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(ApiError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                last_error = Some(error);
            }
        }
    }

    Err(last_error.unwrap_or(ApiError::Api {
        code: "unknown".to_string(),
        message: "Unknown error".to_string(),
    }))
}
