//! Retry with exponential backoff around rate-limited remote calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

use super::error::RemoteError;
use super::limiter::RateLimiter;

/// How many server-imposed pauses one call sits through before giving up.
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 10;

/// Bounded retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        }
    }
}

impl RetryPolicy {
    /// Capped exponential delay before retry number `attempt` (0-based),
    /// before jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff with jitter drawn from 50–100% of the capped delay.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
        base.mul_f64(factor)
    }
}

/// Run `call` under the shared limiter, retrying per `policy`.
///
/// - `Unauthorized` and other non-retryable errors return immediately.
/// - `RateLimited` pauses the shared limiter for everyone and tries again
///   ahead of later arrivals, without consuming a transient retry.
/// - `Transient` retries with backoff until `max_retries` is exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    operation: &str,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    let mut rate_limit_waits = 0u32;
    // Retries re-enter the queue at the original arrival position
    let ticket = limiter.ticket();

    loop {
        limiter.acquire_as(ticket).await;

        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        match err {
            RemoteError::RateLimited { retry_after } => {
                rate_limit_waits += 1;
                if rate_limit_waits > policy.max_rate_limit_waits {
                    warn!(operation, waits = rate_limit_waits, "Giving up after repeated rate limiting");
                    return Err(err);
                }
                limiter.pause(retry_after);
            }
            e if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                attempt += 1;
                warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Remote call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            e => {
                trace!(operation, error = %e, "Remote call failed without retry");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            max_rate_limit_waits: 2,
        }
    }

    #[test]
    fn test_base_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.base_backoff(0), Duration::from_millis(100));
        assert_eq!(p.base_backoff(1), Duration::from_millis(200));
        assert_eq!(p.base_backoff(3), Duration::from_millis(800));
        assert_eq!(p.base_backoff(4), Duration::from_millis(1000));
        assert_eq!(p.base_backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let p = policy();
        for _ in 0..100 {
            let d = p.backoff(2);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retried_until_success() {
        let limiter = RateLimiter::new(6000, 100);
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy(), &limiter, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RemoteError::Transient("reset".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausts_retries() {
        let limiter = RateLimiter::new(6000, 100);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), &limiter, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Transient("503".into()))
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_never_retried() {
        let limiter = RateLimiter::new(6000, 100);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), &limiter, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Unauthorized)
        })
        .await;

        assert_eq!(result, Err(RemoteError::Unauthorized));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_pauses_shared_limiter() {
        let limiter = RateLimiter::new(6000, 100);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = with_retry(&policy(), &limiter, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RemoteError::RateLimited {
                    retry_after: Duration::from_secs(5),
                })
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(limiter.pauses(), 1);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_call_resumes_before_later_calls() {
        let limiter = Arc::new(RateLimiter::new(60, 1));
        let order = Arc::new(Mutex::new(Vec::new()));
        let limited_once = Arc::new(AtomicU32::new(0));

        let spawn_call = |name: &'static str, delay_ms: u64| {
            let limiter = limiter.clone();
            let order = order.clone();
            let limited_once = limited_once.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let result = with_retry(&policy(), &limiter, name, || async {
                    if name == "A" && limited_once.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(RemoteError::RateLimited {
                            retry_after: Duration::from_secs(5),
                        })
                    } else {
                        Ok(())
                    }
                })
                .await;
                assert!(result.is_ok());
                order.lock().push(name);
            })
        };

        let calls = vec![spawn_call("A", 0), spawn_call("B", 100), spawn_call("C", 200)];
        for call in calls {
            call.await.unwrap();
        }

        assert_eq!(*order.lock(), vec!["A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_are_bounded() {
        let limiter = RateLimiter::new(6000, 100);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), &limiter, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::RateLimited {
                retry_after: Duration::from_secs(1),
            })
        })
        .await;

        assert!(matches!(result, Err(RemoteError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
