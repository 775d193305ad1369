//! # Fibonacci Backoff
//!
//! Retry delays for failed reconcile invocations. Grows more slowly than
//! exponential backoff, so a host stuck on a flaky API server is retried
//! often enough to recover quickly without hammering it.
//!
//! Sequence for `min = 5s, max = 60s`: 5s, 5s, 10s, 15s, 25s, 40s, 60s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, starting from `min` twice and
/// capped at `max`. Starting over means building a new one.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);

        result
    }
}
