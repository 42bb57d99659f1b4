//! Bounded exponential backoff for connection establishment.

use std::time::Duration;

use tracing::warn;

/// Retry policy: exponentially increasing delay, capped, with a fixed attempt
/// ceiling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Factor applied per further attempt.
    pub multiplier: f64,
    /// Delay cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Matches the broker connection behavior of the original deployment:
        // up to 10 attempts, 2s..30s exponential delays.
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay_ms = (base_ms * self.multiplier.powi(attempt.saturating_sub(1) as i32)).min(max_ms);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Run a fallible connect closure under the policy.
///
/// The final error is re-raised unchanged so callers can tell "never
/// connected" apart from business failures.
pub async fn connect_with_retry<T, E, F>(policy: &RetryPolicy, mut connect: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: core::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match connect() {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt == attempts => return Err(e),
            Err(e) => {
                let delay = policy.delay_after_attempt(attempt);
                warn!(
                    attempt,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "connection attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    unreachable!("loop always returns on the final attempt")
}
