//! # Fibonacci Backoff
//!
//! Retry delays for floating IPs whose NAT programming failed. Grows more
//! slowly than exponential backoff so a host that comes back is picked up
//! again within a few passes.
//!
//! Sequence with the controller defaults: 5s, 5s, 10s, 15s, 25s, 40s, 65s, ... 300s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum delay in seconds (for reset)
    min_seconds: u64,
    /// Previous delay in seconds
    prev_seconds: u64,
    /// Current delay in seconds
    current_seconds: u64,
    /// Maximum delay in seconds
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with minimum and maximum delays in seconds
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            min_seconds,
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_seconds;

        let next_seconds = self.prev_seconds + self.current_seconds;
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next_seconds, self.max_seconds);

        Duration::from_secs(result)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_seconds = 0;
        self.current_seconds = self.min_seconds;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(5, 300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(5, 300);

        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 10);
        assert_eq!(secs(&mut backoff), 15);
        assert_eq!(secs(&mut backoff), 25);
        assert_eq!(secs(&mut backoff), 40);
    }

    #[test]
    fn test_fibonacci_backoff_max_cap() {
        let mut backoff = FibonacciBackoff::new(1, 10);

        // 1, 1, 2, 3, 5, 8, then 13 capped to 10
        for expected in [1, 1, 2, 3, 5, 8, 10, 10, 10] {
            assert_eq!(secs(&mut backoff), expected);
        }
    }

    #[test]
    fn test_fibonacci_backoff_reset() {
        let mut backoff = FibonacciBackoff::default();

        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 10);

        backoff.reset();

        // Should restart from beginning after success
        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 5);
    }
}
