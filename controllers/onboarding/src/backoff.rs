//! # Exponential Backoff
//!
//! Provides the retry delay used by the reconcile engine when a reconciler asks
//! for a retry. The delay doubles on every consecutive retry of the same
//! resource and is capped, so a resource that keeps failing is revisited at a
//! steady pace instead of never.
//!
//! Default sequence for reconciliation retries: 1s, 2s, 4s, 8s, 16s, 30s (max).

use std::time::Duration;

/// Shortest delay before retrying a reconciliation
pub const MIN_DELAY: Duration = Duration::from_secs(1);
/// Longest delay before retrying a reconciliation
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff calculator
///
/// Each backoff is twice the previous one, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current backoff value
    current: Duration,
    /// Maximum backoff value
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with the given minimum and maximum delay
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        result
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(MIN_DELAY, MAX_DELAY)
    }
}
