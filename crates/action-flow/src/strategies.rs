//! Retry loop and backoff calculation

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::types::RetryPolicy;

/// Delay before the retry that follows failed attempt `attempt` (1-based):
/// `base_delay * backoff_multiplier^(attempt-1)`, capped at `max_delay`.
pub fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let base_ms = policy.base_delay.as_millis() as f64;
    let total_ms = base_ms * policy.backoff_multiplier.max(1.0).powi(exponent);
    let cap_ms = policy.max_delay.as_millis() as f64;
    if !total_ms.is_finite() || total_ms >= cap_ms {
        policy.max_delay
    } else {
        Duration::from_millis(total_ms.round() as u64)
    }
}

/// Run `operation` until it succeeds or the policy is exhausted, retrying every error.
///
/// `operation` receives the 1-based attempt number. Before each retry the loop
/// sleeps for the backoff and then awaits `on_retry(failed_attempt, &error)`.
/// The last error is returned unchanged.
pub async fn with_retry<T, E, Op, Fut, OnRetry, RetryFut>(
    policy: &RetryPolicy,
    operation: Op,
    on_retry: OnRetry,
) -> Result<T, E>
where
    E: Display,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    OnRetry: FnMut(u32, &E) -> RetryFut,
    RetryFut: Future<Output = ()>,
{
    with_retry_if(policy, |_| true, operation, on_retry).await
}

/// [`with_retry`] that gives up immediately on errors `is_retryable` rejects.
pub async fn with_retry_if<T, E, Pred, Op, Fut, OnRetry, RetryFut>(
    policy: &RetryPolicy,
    is_retryable: Pred,
    mut operation: Op,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    E: Display,
    Pred: Fn(&E) -> bool,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    OnRetry: FnMut(u32, &E) -> RetryFut,
    RetryFut: Future<Output = ()>,
{
    let mut attempt = 1;
    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retryable(&err) {
            debug!(attempt, error = %err, "Error is not retryable");
            return Err(err);
        }
        if attempt > policy.max_retries {
            warn!(attempt, error = %err, "Retries exhausted");
            return Err(err);
        }
        let delay = calculate_backoff(policy, attempt);
        warn!(
            attempt,
            max_attempts = policy.max_attempts(),
            backoff_ms = delay.as_millis() as u64,
            error = %err,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        on_retry(attempt, &err).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    struct Boom(u32);

    impl Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom #{}", self.0)
        }
    }

    #[test]
    fn test_calculate_backoff() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(5000),
        };
        assert_eq!(calculate_backoff(&policy, 1), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(&policy, 2), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(&policy, 3), Duration::from_millis(4000));
        assert_eq!(calculate_backoff(&policy, 4), Duration::from_millis(5000));
        assert_eq!(calculate_backoff(&policy, 400), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn fails_k_times_then_succeeds() {
        let calls = Cell::new(0u32);
        let retries = RefCell::new(Vec::new());
        let result = with_retry(
            &RetryPolicy::immediate(5),
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt <= 3 {
                        Err(Boom(attempt))
                    } else {
                        Ok("done")
                    }
                }
            },
            |attempt, _err| {
                retries.borrow_mut().push(attempt);
                async {}
            },
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 4);
        assert_eq!(*retries.borrow(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn always_failing_runs_max_retries_plus_one_times() {
        let calls = Cell::new(0u32);
        let result: Result<(), Boom> = with_retry(
            &RetryPolicy::immediate(2),
            |attempt| {
                calls.set(calls.get() + 1);
                async move { Err(Boom(attempt)) }
            },
            |_, _| async {},
        )
        .await;

        assert_eq!(calls.get(), 3);
        assert_eq!(result, Err(Boom(3)));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let calls = Cell::new(0u32);
        let hooks = Cell::new(0u32);
        let result: Result<(), Boom> = tokio_test::block_on(with_retry(
            &RetryPolicy::immediate(0),
            |attempt| {
                calls.set(calls.get() + 1);
                async move { Err(Boom(attempt)) }
            },
            |_, _| {
                hooks.set(hooks.get() + 1);
                async {}
            },
        ));
        assert_eq!(result, Err(Boom(1)));
        assert_eq!(calls.get(), 1);
        assert_eq!(hooks.get(), 0);
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let calls = Cell::new(0u32);
        let result: Result<(), Boom> = with_retry_if(
            &RetryPolicy::immediate(5),
            |err: &Boom| err.0 != 2,
            |attempt| {
                calls.set(calls.get() + 1);
                async move { Err(Boom(attempt)) }
            },
            |_, _| async {},
        )
        .await;
        assert_eq!(result, Err(Boom(2)));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_backoff_between_attempts() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 3.0,
            max_delay: Duration::from_secs(10),
        };
        let started = Instant::now();
        let result: Result<(), Boom> =
            with_retry(&policy, |attempt| async move { Err(Boom(attempt)) }, |_, _| async {}).await;
        assert!(result.is_err());
        // 100 + 300 + 900
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1400), "{elapsed:?}");
    }
}
