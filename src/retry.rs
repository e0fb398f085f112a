use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try and how long to wait in between
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base of the exponential backoff: `base * 2^attempt`
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter added to each delay
    pub max_jitter: Duration,
}

impl RetryPolicy {
    /// `2^attempt` seconds plus up to 1s of jitter
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            self.max_jitter.mul_f64(rand::rng().random_range(0.0..1.0))
        };
        backoff + jitter
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: E },
}

/// Runs `op` until it succeeds or the policy's attempts are used up.
/// Sleeps between attempts, never after the last one.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                }
            }
            Err(e) if attempt >= max_attempts => {
                warn!("[Retry {}] {} failed: {}. Giving up.", attempt, label, e);
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e,
                };
            }
            Err(e) => {
                let wait = policy.delay_for(attempt);
                warn!(
                    "[Retry {}] {} failed: {}. Retrying in {:.1}s...",
                    attempt,
                    label,
                    e,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let outcome = retry(&RetryPolicy::immediate(3), "upload", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("attempt {} failed", n))
            } else {
                Ok(n)
            }
        })
        .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded { value: 3, attempts: 3 }));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let outcome: RetryOutcome<(), String> = retry(&RetryPolicy::immediate(2), "upload", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("connection reset".to_string())
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match outcome {
            RetryOutcome::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error, "connection reset");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let policy = RetryPolicy::exponential(3);
        for attempt in 1..=3 {
            let delay = policy.delay_for(attempt);
            let floor = Duration::from_secs(2u64.pow(attempt));
            assert!(delay >= floor && delay < floor + Duration::from_secs(1));
        }
    }
}
