//! Bounded exponential backoff for failed discovery reconciles
//!
//! The kube runtime calls the error policy once per failed reconcile; the
//! policy itself is stateless, so attempts are counted per deployment in a
//! shared map and cleared on the first successful reconcile.

use crate::controllers::config::RetryConfig;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Explicit backoff policy: `initialInterval * multiplier^(attempt-1)` up to
/// `maxAttempts`, then give up.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    initial_interval: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(initial_interval: Duration, multiplier: f64, max_attempts: u32) -> Self {
        RetryPolicy {
            initial_interval,
            multiplier,
            max_attempts,
        }
    }

    /// Delay before the given attempt (1-based), or `None` once the attempt
    /// budget is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi((attempt - 1) as i32);
        Some(self.initial_interval.mul_f64(factor))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(
            Duration::from_secs_f64(config.initial_interval_seconds),
            config.multiplier,
            config.max_attempts,
        )
    }
}

/// Per-resource failure counters keyed by `namespace/name`.
#[derive(Clone, Default)]
pub struct RetryTracker {
    attempts: Arc<DashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        RetryTracker::default()
    }

    /// Records a failure and returns the attempt number it represents.
    pub fn record_failure(&self, key: &str) -> u32 {
        let mut entry = self.attempts.entry(key.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }
}
