use std::future::Future;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
///
/// Every attempt is bounded by `policy.timeout_ms`; the delay between attempts
/// doubles from `base_delay_ms` up to `max_delay_ms`. `max_retries == 0`
/// retries forever.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    mut task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: FnMut() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempts = 0;
    let mut delay = policy.base_delay();

    loop {
        let error = match timeout(policy.timeout(), task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => Error::RetryTimeout,
        };

        attempts += 1;
        if policy.max_retries != 0 && attempts >= policy.max_retries {
            warn!(attempts, error = %error, "Task failed after max retries");
            return Err(Error::RetryExhausted {
                attempts,
                last: Box::new(error),
            });
        }

        warn!(attempts, ?delay, error = %error, "Retrying task");
        sleep(delay).await;
        delay = (delay * 2).min(policy.max_delay());
    }
}
