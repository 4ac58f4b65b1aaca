//! Bounded exponential backoff for sink retries

use super::clock::Clock;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(2_000),
        }
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    current_attempt: u32,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Maximum retry attempts exceeded")]
pub struct MaxRetriesExceeded;

impl ExponentialBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current_attempt: 0,
        }
    }

    /// Delay before the next retry, doubling per attempt up to `max_delay`
    pub fn next_delay(&self) -> Duration {
        let factor = 2_u32.saturating_pow(self.current_attempt);
        self.policy
            .initial_delay
            .saturating_mul(factor)
            .min(self.policy.max_delay)
    }

    /// Sleep before the next retry, or fail once every retry is spent
    pub async fn sleep(&mut self, clock: &dyn Clock) -> Result<(), MaxRetriesExceeded> {
        // The first attempt is not a retry
        if self.current_attempt + 1 >= self.policy.max_attempts {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.next_delay();

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.policy.max_attempts.saturating_sub(1),
            delay.as_millis()
        );

        clock.sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }
}
