//! Bounded exponential backoff for transient ledger errors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use randmint_core::{Result, RetryConfig};

/// Retry schedule applied to operations that fail with
/// `MintError::TransientNetwork`. Any other error is returned at once.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Add up to a quarter of the delay at random.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry up to `max_attempts` times without waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay after `current`, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let spread = delay.as_millis() as u64 / 4;
        if !self.jitter || spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    /// Run `f` until it succeeds, fails with a non-transient error, or the
    /// attempts are exhausted. The last transient error is returned in the
    /// latter case.
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let wait = self.jittered(delay);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = wait.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying",
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    delay = self.next_delay(delay);
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(operation, attempts = attempt, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use randmint_core::MintError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_next_delay_doubles_and_clamps() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_delay(Duration::from_secs(8)), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .retry("send", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(MintError::transient("send", "timeout"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejection() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::immediate(5)
            .retry("transfer", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MintError::rejected("transfer", None, "paused"))
            })
            .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::immediate(2)
            .retry("deploy", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(MintError::transient("deploy", "connection reset"))
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
