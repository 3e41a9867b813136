//! Bounded exponential backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Retry policy for transient segment failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first failure
    pub max_retries: u32,

    /// Delay before the first retry; doubles per subsequent retry
    pub base_delay: Duration,

    /// Ceiling on any single backoff sleep
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    ///
    /// Full-jitter on the upper half: the sleep lands uniformly in
    /// `[cap/2, cap]` where `cap = base * 2^(attempt-1)`, clamped to
    /// `max_delay`. Keeps a floor under the sleep while decorrelating
    /// concurrent retriers.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let cap = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let half = cap / 2;
        let jitter_ms = if half.as_millis() > 0 {
            rand::thread_rng().gen_range(0..=half.as_millis() as u64)
        } else {
            0
        };
        half + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_the_envelope() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        };
        for attempt in 1..=8 {
            let cap = policy
                .base_delay
                .saturating_mul(1u32 << (attempt - 1))
                .min(policy.max_delay);
            for _ in 0..32 {
                let delay = policy.backoff_delay(attempt);
                assert!(delay >= cap / 2, "attempt {attempt}: {delay:?} below floor");
                assert!(delay <= cap, "attempt {attempt}: {delay:?} above cap");
            }
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 50,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        };
        // Far past the doubling range the cap holds.
        assert!(policy.backoff_delay(40) <= Duration::from_secs(30));
    }
}
