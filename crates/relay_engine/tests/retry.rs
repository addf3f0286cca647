use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use relay_engine::{retry_with_backoff, RetryPolicy, RetryVerdict};

#[derive(Debug, PartialEq)]
enum Failure {
    Busy(u64),
    Broken,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

fn verdict(err: &Failure) -> RetryVerdict {
    match err {
        Failure::Busy(secs) => RetryVerdict::RateLimited(Duration::from_secs(*secs)),
        Failure::Broken => RetryVerdict::Hard,
    }
}

#[tokio::test(start_paused = true)]
async fn hard_errors_exhaust_attempts_with_fixed_backoff() {
    let calls = AtomicU32::new(0);
    let started = tokio::time::Instant::now();

    let result: Result<(), Failure> = retry_with_backoff(
        &RetryPolicy::default(),
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure::Broken) }
        },
        verdict,
    )
    .await;

    assert_eq!(result, Err(Failure::Broken));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Backoff between attempts only, not after the last one.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
}

#[tokio::test(start_paused = true)]
async fn rate_limits_do_not_consume_attempts() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy {
        max_attempts: 1,
        ..RetryPolicy::default()
    };

    let result = retry_with_backoff(
        &policy,
        |call| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call <= 4 {
                    Err(Failure::Busy(30))
                } else {
                    Ok(call)
                }
            }
        },
        verdict,
    )
    .await;

    assert_eq!(result, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn endless_rate_limiting_still_terminates() {
    let policy = RetryPolicy {
        max_rate_limit_waits: 2,
        ..RetryPolicy::default()
    };
    let calls = AtomicU32::new(0);

    let result: Result<(), Failure> = retry_with_backoff(
        &policy,
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure::Busy(1)) }
        },
        verdict,
    )
    .await;

    assert_eq!(result, Err(Failure::Busy(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
