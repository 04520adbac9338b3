//! Exponential backoff for compare-and-swap retry loops.

use crate::config::BackoffConfig;
use crate::sync;

/// Per-operation retry state.
pub(crate) struct Backoff<'c> {
    config: &'c BackoffConfig,
    step: u32,
    failures: u32,
}

impl<'c> Backoff<'c> {
    pub(crate) fn new(config: &'c BackoffConfig) -> Self {
        Self {
            config,
            step: 0,
            failures: 0,
        }
    }

    /// Record a failed attempt and wait before the next one.
    pub(crate) fn snooze(&mut self) {
        self.failures = self.failures.saturating_add(1);
        #[cfg(loom)]
        {
            sync::yield_now();
        }
        #[cfg(not(loom))]
        {
            if self.step <= self.config.spin_limit {
                let exponent = self.step.min(BackoffConfig::MAX_SPIN_LIMIT);
                for _ in 0..(1u32 << exponent) {
                    sync::spin_loop();
                }
            } else {
                sync::yield_now();
            }
        }
        if self.step < self.config.yield_limit {
            self.step += 1;
        }
    }

    /// Failed attempts so far.
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether a bounded operation should stop retrying.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.failures >= self.config.max_attempts
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn step_stops_at_yield_limit() {
        let config = BackoffConfig {
            spin_limit: 1,
            yield_limit: 3,
            max_attempts: 100,
        };
        let mut backoff = Backoff::new(&config);
        for _ in 0..10 {
            backoff.snooze();
        }
        assert_eq!(backoff.step, 3);
        assert_eq!(backoff.failures(), 10);
    }

    #[test]
    fn unvalidated_spin_limit_does_not_overflow_shift() {
        let config = BackoffConfig {
            spin_limit: 40,
            yield_limit: 40,
            max_attempts: 100,
        };
        let mut backoff = Backoff::new(&config);
        for _ in 0..40 {
            backoff.snooze();
        }
        assert_eq!(backoff.failures(), 40);
        assert_eq!(backoff.step, 40);
    }

    #[test]
    fn exhausted_after_max_attempts() {
        let config = BackoffConfig {
            max_attempts: 2,
            ..BackoffConfig::default()
        };
        let mut backoff = Backoff::new(&config);
        assert!(!backoff.is_exhausted());
        backoff.snooze();
        assert!(!backoff.is_exhausted());
        backoff.snooze();
        assert!(backoff.is_exhausted());
    }
}
