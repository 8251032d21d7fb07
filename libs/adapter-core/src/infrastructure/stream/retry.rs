//! Stream Retry Policy
//!
//! Exponential backoff with jitter for transient stream failures. The
//! policy only shapes the delay between attempts; the bounded error budget
//! that eventually stops a multiplexer lives in the worker itself.

use std::time::Duration;

use rand::Rng;

/// Configuration for retry backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter fraction (0.1 = ±10% randomization).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Mutable backoff state for one multiplexer worker.
///
/// # Example
///
/// ```rust
/// use adapter_core::infrastructure::stream::{RetryConfig, RetryPolicy};
///
/// let mut policy = RetryPolicy::new(RetryConfig::default());
/// let first = policy.next_delay();
/// let second = policy.next_delay();
/// assert!(second >= first);
///
/// // After a successful connect the series starts over
/// policy.reset();
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    current: Duration,
    attempts: u32,
}

impl RetryPolicy {
    /// Create a policy at the start of its series.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let current = config.initial_delay;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt, advancing the series.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts += 1;
        let delay = self.apply_jitter(self.current);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u64
            }
        } else {
            0
        };
        let max_millis =
            u64::try_from(self.config.max_delay.as_millis()).unwrap_or(u64::MAX);
        self.current = Duration::from_millis(next_millis.min(max_millis));

        delay
    }

    /// Restart the series after a successful connection.
    pub const fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let range = base_millis * self.config.jitter;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-range..=range);
        let adjusted = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
            jitter: 0.0,
        })
    }

    #[test]
    fn default_config_values() {
        let config = RetryConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.jitter - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn delays_grow_exponentially() {
        let mut policy = no_jitter(100, 10_000, 2.0);

        assert_eq!(policy.next_delay(), Duration::from_millis(100));
        assert_eq!(policy.next_delay(), Duration::from_millis(200));
        assert_eq!(policy.next_delay(), Duration::from_millis(400));
        assert_eq!(policy.next_delay(), Duration::from_millis(800));
        assert_eq!(policy.attempts(), 4);
    }

    #[test]
    fn delays_cap_at_max() {
        let mut policy = no_jitter(1000, 2000, 4.0);

        let _ = policy.next_delay();
        assert_eq!(policy.next_delay(), Duration::from_millis(2000));
        assert_eq!(policy.next_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn reset_restarts_the_series() {
        let mut policy = no_jitter(100, 10_000, 2.0);

        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempts(), 2);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = RetryPolicy::new(RetryConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                jitter: 0.1,
            });
            let millis = policy.next_delay().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms outside ±10%");
        }
    }
}
