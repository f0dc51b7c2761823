// src/engine/schedule.rs

//! Time budget of the cycle loop.
//!
//! The budget is charged the *nominal* interval per cycle, never the
//! measured one, so slow cycles do not shorten the run. A cycle that overran
//! its interval is followed immediately by the next one; lateness is not
//! carried forward.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
    remaining: Option<Duration>,
}

impl Schedule {
    /// `total = None` never runs out.
    pub fn new(interval: Duration, total: Option<Duration>) -> Self {
        Self {
            interval,
            remaining: total,
        }
    }

    /// Budget left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }

    /// Whether another cycle should start.
    pub fn has_remaining(&self) -> bool {
        self.remaining.is_none_or(|left| !left.is_zero())
    }

    /// Charge one cycle and return how long to sleep before the next.
    pub fn complete_cycle(&mut self, elapsed: Duration) -> Duration {
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(self.interval);
        }
        self.interval.saturating_sub(elapsed)
    }
}
