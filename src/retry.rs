// SPDX-License-Identifier: MIT

//! Retry policy with exponential backoff and jitter
//!
//! Used as a decorator around nodes whose capability calls may fail
//! transiently (rate limits, network hiccups). Retrying is never implicit:
//! a plain function node surfaces its first failure.

use rand::Rng;
use std::time::Duration;

/// Configuration for retrying failed capability invocations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Base delay in seconds before the first retry
    pub initial_interval: f64,
    /// Multiplier applied per attempt (2.0 doubles the delay each time)
    pub backoff_factor: f64,
    /// Ceiling on the computed delay, in seconds
    pub max_interval: f64,
    /// Randomize each delay by 0.5x-1.5x to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 60.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts` completed tries
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based: the delay after the
    /// first failure is `calculate_delay(0)`)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let mut secs = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        secs = secs.min(self.max_interval);

        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
            secs *= factor;
        }

        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.jitter);
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_exponential_backoff_without_jitter() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(0.5)
            .with_backoff_factor(2.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_secs_f64(0.5));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs_f64(1.0));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs_f64(2.0));
    }

    #[test]
    fn test_delay_capped_at_max_interval() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval(1.0)
            .with_backoff_factor(10.0)
            .with_max_interval(5.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(6), Duration::from_secs_f64(5.0));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::new(3).with_initial_interval(1.0).with_jitter(true);

        for _ in 0..50 {
            let delay = policy.calculate_delay(0).as_secs_f64();
            assert!((0.5..1.5).contains(&delay), "delay out of band: {}", delay);
        }
    }
}
