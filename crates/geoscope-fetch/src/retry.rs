//! Exponential backoff with full jitter.
//!
//! Shared by the performance client and the job manager. Delays grow as
//! `base * 2^attempt`, are capped, and then a uniformly random slice of the
//! capped delay is used (full jitter).

use std::time::Duration;

use rand::Rng;

/// Retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Jittered delay before the given retry attempt (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.base_delay, self.max_delay)
    }
}

/// Full-jitter backoff: uniform in `[0, min(max, base * 2^attempt)]`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base
        .as_millis()
        .saturating_mul(1u128 << attempt.min(20))
        .min(max.as_millis()) as u64;
    if exp == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=exp))
}
