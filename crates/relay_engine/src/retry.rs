use std::future::Future;
use std::time::Duration;

use relay_logging::relay_warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts that may end in a hard error.
    pub max_attempts: u32,
    pub hard_error_backoff: Duration,
    /// Rate-limit waits allowed on top of the attempts.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            hard_error_backoff: Duration::from_secs(5),
            max_rate_limit_waits: 10,
        }
    }
}

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryVerdict {
    /// Sleep for the signalled duration; the attempt is not counted.
    RateLimited(Duration),
    /// Counts against `max_attempts`, followed by the fixed backoff.
    Hard,
}

/// Run `op` until it succeeds or the policy is exhausted; the last error is returned.
///
/// `op` receives the 1-based number of the call being made.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryVerdict,
    E: std::fmt::Display,
{
    let mut hard_failures = 0;
    let mut rate_limit_waits = 0;
    let mut call = 0;
    loop {
        call += 1;
        let err = match op(call).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match classify(&err) {
            RetryVerdict::RateLimited(wait) => {
                rate_limit_waits += 1;
                if rate_limit_waits > policy.max_rate_limit_waits {
                    relay_warn!("Giving up after {} rate-limit waits", policy.max_rate_limit_waits);
                    return Err(err);
                }
                relay_warn!("Rate limited, waiting {}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
            RetryVerdict::Hard => {
                hard_failures += 1;
                if hard_failures >= policy.max_attempts {
                    relay_warn!("Attempt {hard_failures}/{} failed: {err}", policy.max_attempts);
                    return Err(err);
                }
                relay_warn!(
                    "Attempt {hard_failures}/{} failed: {err}; retrying in {}s",
                    policy.max_attempts,
                    policy.hard_error_backoff.as_secs_f64()
                );
                tokio::time::sleep(policy.hard_error_backoff).await;
            }
        }
    }
}
