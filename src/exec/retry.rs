//! Bounded retry with a fixed delay.
//!
//! `retry` surfaces the last error, `retry_or` swaps it for a fallback.
//! Each failed attempt logs one warn line: `"{label} {attempt}/{max}: {err}"`.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_extra_attempts: u32,
    /// Pause between attempts; zero skips the sleep.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_extra_attempts: u32, delay: Duration) -> Self {
        Self {
            max_extra_attempts,
            delay,
        }
    }

    pub const fn immediate(max_extra_attempts: u32) -> Self {
        Self::new(max_extra_attempts, Duration::ZERO)
    }

    pub const fn total_attempts(&self) -> u32 {
        self.max_extra_attempts + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(3)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_while(policy, label, |_| true, op).await
}

/// Like [`retry`], but gives up early when `should_retry` rejects the error.
pub async fn retry_while<T, F, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    should_retry: P,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&anyhow::Error) -> bool,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("{} {}/{}: {:#}", label, attempt, policy.max_extra_attempts, e);
                if attempt >= policy.max_extra_attempts || !should_retry(&e) {
                    return Err(e);
                }
                attempt += 1;
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
}

/// Never fails: returns `fallback` once every attempt has failed.
pub async fn retry_or<T, F, Fut>(policy: RetryPolicy, label: &str, fallback: T, op: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry(policy, label, op).await.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_succeeds_after_max_extra_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let result = retry(policy, "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(anyhow!("attempt {} failed", n))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fallback_after_exactly_r_plus_one_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(2);
        let value: Option<u64> = retry_or(policy, "always-down", None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("rpc timeout")) }
        })
        .await;

        assert_eq!(value, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_extra_attempts_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(RetryPolicy::immediate(0), "once", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("nope")) }
        })
        .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_early() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_while(
            RetryPolicy::immediate(5),
            "validation",
            |e| !e.to_string().contains("insufficient"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(anyhow!("insufficient funds")) }
            },
        )
        .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(500));
        let _: Option<()> = retry_or(policy, "slow", None, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("down")) }
        })
        .await;

        // Two sleeps between three attempts, none after the last one.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }
}
