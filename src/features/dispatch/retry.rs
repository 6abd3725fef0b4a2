//! Bounded exponential backoff for batch delivery.

use crate::core::error::Result;
use crate::features::dispatch::batch::Batch;
use crate::features::dispatch::sink::EventSink;
use log::warn;
use rand::Rng;
use std::time::Duration;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(crate::core::config::DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay.max(base_delay);
        self
    }

    /// Upper bound of the wait after `failed_attempts` failures
    pub fn ceiling_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Wait after `failed_attempts` failures: half the ceiling plus jitter
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let ceiling = self.ceiling_for(failed_attempts).as_millis() as u64;
        let floor = ceiling / 2;
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(floor..=ceiling))
    }
}

/// Send a batch, retrying retryable failures until the policy runs out.
/// Returns the number of attempts used on success.
pub async fn send_with_retry(
    sink: &dyn EventSink,
    batch: &Batch,
    policy: &RetryPolicy,
) -> Result<u32> {
    let mut attempt = 1;
    loop {
        match sink.send(batch).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Dispatch attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the given status
    struct FlakySink {
        failures: u32,
        status: u16,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventSink for FlakySink {
        async fn send(&self, _batch: &Batch) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(Error::Rejected {
                    status: self.status,
                    retryable: self.status >= 500,
                });
            }
            Ok(())
        }
    }

    fn empty_batch() -> Batch {
        Batch {
            slug: "acme".to_string(),
            events: Vec::new(),
            user_id: String::new(),
            invocation_id: String::new(),
            project_key: String::new(),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_delays(Duration::from_millis(1), Duration::from_millis(5))
    }

    #[test]
    fn test_ceiling_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(5)
            .with_delays(Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.ceiling_for(1), Duration::from_millis(100));
        assert_eq!(policy.ceiling_for(2), Duration::from_millis(200));
        assert_eq!(policy.ceiling_for(3), Duration::from_millis(400));
        assert_eq!(policy.ceiling_for(4), Duration::from_millis(500));
        assert_eq!(policy.ceiling_for(40), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let policy = RetryPolicy::new(5)
            .with_delays(Duration::from_millis(100), Duration::from_secs(10));
        for _ in 0..50 {
            let delay = policy.delay_for(3);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let sink = FlakySink {
            failures: 2,
            status: 503,
            calls: AtomicU32::new(0),
        };
        let attempts = send_with_retry(&sink, &empty_batch(), &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let sink = FlakySink {
            failures: 10,
            status: 500,
            calls: AtomicU32::new(0),
        };
        let result = send_with_retry(&sink, &empty_batch(), &fast_policy(3)).await;
        assert!(result.is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let sink = FlakySink {
            failures: 10,
            status: 400,
            calls: AtomicU32::new(0),
        };
        let result = send_with_retry(&sink, &empty_batch(), &fast_policy(5)).await;
        assert!(matches!(result, Err(Error::Rejected { status: 400, .. })));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
