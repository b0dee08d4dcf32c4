//! # Fibonacci Backoff
//!
//! Progressive retry backoff that grows along the Fibonacci sequence,
//! slower than exponential backoff. Values are computed in minutes and
//! returned as seconds: 1m, 1m, 2m, 3m, 5m, 8m, then capped.
//!
//! ```rust
//! use argocd_local_user_controller::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 60);
//! assert_eq!(backoff.next_backoff_seconds(), 120);
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each returned value is the sum of the previous two, starting from the
/// minimum and capped at the maximum. One instance tracks the retry state
/// of one resource.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Floor in minutes, restored by [`reset`](Self::reset)
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    /// Ceiling in minutes capping the sequence
    max_minutes: u64,
}

impl FibonacciBackoff {
    /// Create a backoff ranging from `min_minutes` to `max_minutes`
    ///
    /// The usual configuration for reconciliation errors is `new(1, 10)`,
    /// yielding 1m, 1m, 2m, 3m, 5m, 8m, 10m.
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Return the current backoff in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result_seconds = self.current_minutes * 60;

        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = std::cmp::min(next_minutes, self.max_minutes);

        result_seconds
    }

    /// Return the current backoff as a [`Duration`] and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// Restart the sequence from the minimum, after a success
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_follows_fibonacci_and_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        let produced: Vec<u64> = (0..9).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(produced, [60, 60, 120, 180, 300, 480, 600, 600, 600]);
    }

    #[test]
    fn test_reset_restarts_from_minimum() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        for _ in 0..4 {
            backoff.next_backoff_seconds();
        }
        backoff.reset();

        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.next_backoff_seconds(), 120);
    }

    #[test]
    fn test_next_backoff_returns_duration() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
    }

    #[test]
    fn test_instances_advance_independently() {
        let mut first = FibonacciBackoff::new(1, 10);
        let mut second = FibonacciBackoff::new(1, 10);

        for _ in 0..5 {
            first.next_backoff_seconds();
        }
        assert_eq!(second.next_backoff_seconds(), 60);

        first.reset();
        assert_eq!(first.next_backoff_seconds(), 60);
        assert_eq!(second.next_backoff_seconds(), 60);
        assert_eq!(second.next_backoff_seconds(), 120);
    }
}
