//! Delays between status requests.

use std::time::Duration;

/// Fibonacci backoff: `1, 1, 2, 3, 5, ...` times the initial delay,
/// capped at the maximum delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: u32,
    next: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: 1,
            next: 1,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self
            .initial
            .checked_mul(self.current)
            .map_or(self.max, |d| d.min(self.max));
        // Stop advancing once capped so the factors cannot overflow.
        if delay < self.max {
            let sum = self.current.saturating_add(self.next);
            self.current = self.next;
            self.next = sum;
        }
        Some(delay)
    }
}
