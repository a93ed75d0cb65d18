//! Bounded retry with exponential backoff for remote calls

use std::future::Future;
use std::time::Duration;

use crate::config::SyncSettings;
use crate::remote::{RemoteResult, TransportError};

/// Attempt bound, backoff schedule and per-call timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    pub const fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.backoff_base(),
            max_delay: settings.backoff_max(),
            timeout: settings.request_timeout(),
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Run `call` until it succeeds or the attempts run out.
    ///
    /// Only transport failures come back as `Err`, so every error is retried.
    /// A call exceeding the timeout counts as `TransportError::Timeout`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(error) if attempt >= attempts => {
                    tracing::warn!(operation, attempt, %error, "Remote call failed, giving up");
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        %error,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::from_settings(
            &SyncSettings::default()
                .with_max_attempts(attempts)
                .with_backoff(Duration::from_millis(1_000), Duration::from_millis(5_000))
                .with_request_timeout(Duration::from_millis(500)),
        )
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = policy(3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run("fetch", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TransportError::Unreachable("offline".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bound() {
        let calls = AtomicU32::new(0);
        let result: RemoteResult<()> = policy(3)
            .run("push", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Unreachable("offline".into()))
            })
            .await;
        assert_eq!(result, Err(TransportError::Unreachable("offline".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let result: RemoteResult<()> = policy(1)
            .run("fetch", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert_eq!(result, Err(TransportError::Timeout));
    }
}
