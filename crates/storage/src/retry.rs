//! Exponential backoff with jitter for C2 operations (spec §4.2: "transient
//! 5xx/timeouts retried, 4xx (except 429) fatal"). Generalizes the
//! sleep-then-retry shape of the teacher's `services::poller::
//! retry_304_checkpoints` loop from "retry up to N times on a fixed delay"
//! to "retry up to N times on an exponentially growing, jittered delay".

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::thread_rng().gen_range(capped / 2..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}

/// `true` for an `object_store::Error` that should be retried: network
/// errors, timeouts, and anything not-found/precondition related to a race
/// rather than a permanent rejection. 404s and other "this will never
/// succeed" errors are not retried.
pub fn is_retryable(err: &object_store::Error) -> bool {
    !matches!(
        err,
        object_store::Error::NotFound { .. } | object_store::Error::AlreadyExists { .. }
    )
}

/// Run `op` up to `policy.max_attempts` times, sleeping with exponential
/// backoff + jitter between attempts, stopping early if `should_retry`
/// returns `false` for the error produced.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: RetryPolicy,
    should_retry: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !should_retry(&e) {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retries_until_success() {
        let mut calls = 0;
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let result: Result<i32, &str> = retry_with_backoff(policy, |_| true, || {
            calls += 1;
            async move {
                if calls < 3 {
                    Err("transient")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn stops_retrying_when_should_retry_is_false() {
        let mut calls = 0;
        let policy = RetryPolicy::default();
        let result: Result<i32, &str> = retry_with_backoff(policy, |_| false, || {
            calls += 1;
            async move { Err("fatal") }
        })
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let result: Result<i32, &str> = retry_with_backoff(policy, |_| true, || {
            calls += 1;
            async move { Err("always fails") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
