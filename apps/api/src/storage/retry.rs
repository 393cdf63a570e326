//! Read-after-write consistency helper for the eventually consistent store.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(50),
        }
    }
}

/// Runs `op` until it yields `Ok(Some(_))` or attempts are exhausted.
///
/// `Ok(None)` means "not visible yet" and is retried with a doubling delay
/// (50ms, 100ms, 200ms with the default policy). Errors abort immediately.
/// Returns `Ok(None)` when the value never became visible.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 0..attempts {
        if attempt > 0 {
            let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
            let delay = policy.initial_delay.saturating_mul(factor);
            debug!(
                "{what} not visible yet (attempt {attempt}), retrying after {}ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        if let Some(value) = op().await? {
            return Ok(Some(value));
        }
    }

    debug!("{what} still not visible after {attempts} attempts");
    Ok(None)
}
