//! Leaky bucket accounting.

use std::time::Duration;
use tokio::time::Instant;

/// How a requested amount relates to the space left in the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// Admitting the amount would push the level past the ceiling.
    Overflow,
    /// The amount fills the bucket exactly to the ceiling.
    Exact,
    /// The amount fits and leaves room to spare.
    Slack,
}

/// A bucket that fills on admission and drains continuously with time.
///
/// The level is never decremented by callers. It only drops through
/// [`Bucket::drain`], which leaks `elapsed * rate_per_sec` units.
#[derive(Debug, Clone)]
pub struct Bucket {
    /// Ceiling on the admitted amount within one time period
    max_rate: f64,
    /// Drain rate, fixed at construction
    rate_per_sec: f64,
    /// Current fill
    level: f64,
    /// When the level was last drained
    last_check: Instant,
}

impl Bucket {
    /// Create an empty bucket holding `max_rate` units per `time_period`.
    pub fn new(max_rate: f64, time_period: Duration) -> Self {
        Self {
            max_rate,
            rate_per_sec: max_rate / time_period.as_secs_f64(),
            level: 0.0,
            last_check: Instant::now(),
        }
    }

    /// Leak out whatever has drained since the last check.
    pub fn drain(&mut self, now: Instant) {
        if self.level > 0.0 {
            let elapsed = now.saturating_duration_since(self.last_check).as_secs_f64();
            self.level = (self.level - elapsed * self.rate_per_sec).max(0.0);
        }
        self.last_check = self.last_check.max(now);
    }

    /// Classify `amount` against the current level without changing it.
    pub fn fits(&self, amount: f64) -> Fit {
        let requested = self.level + amount;
        if requested > self.max_rate {
            Fit::Overflow
        } else if requested == self.max_rate {
            Fit::Exact
        } else {
            Fit::Slack
        }
    }

    /// Charge an admitted amount to the bucket.
    pub fn fill(&mut self, amount: f64) {
        self.level += amount;
    }

    /// Minimum time for the bucket to leak `amount` units.
    pub fn leak_time(&self, amount: f64) -> Duration {
        Duration::from_secs_f64(amount / self.rate_per_sec)
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    pub fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }

    pub fn last_check(&self) -> Instant {
        self.last_check
    }
}
