// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`schedule`] is the pure budget/sleep arithmetic of the cycle loop.
//! - [`watchdog`] bounds each cycle by killing every in-flight process once
//!   the deadline passes.
//! - [`orchestrator`] builds the (device × command) task list and drives
//!   the loop, teardown and final tasks.

use std::time::Duration;

pub mod orchestrator;
pub mod schedule;
pub mod watchdog;

pub use orchestrator::Orchestrator;
pub use schedule::Schedule;
pub use watchdog::Watchdog;

/// How the per-cycle deadline is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTiming {
    /// Budget granted per task in the cycle.
    pub per_task: Duration,
    /// Lower bound regardless of task count.
    pub floor: Duration,
}

impl WatchdogTiming {
    /// `max(per_task × task_count, floor)`.
    pub fn timeout_for(&self, task_count: usize) -> Duration {
        let scaled = self
            .per_task
            .saturating_mul(u32::try_from(task_count).unwrap_or(u32::MAX));
        scaled.max(self.floor)
    }
}

impl Default for WatchdogTiming {
    fn default() -> Self {
        Self {
            per_task: Duration::from_secs(10),
            floor: Duration::from_secs(10),
        }
    }
}

/// Loop settings for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub interval: Duration,
    /// `None` runs until interrupted.
    pub total: Option<Duration>,
    pub watchdog: WatchdogTiming,
}

/// What happened during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Completed cycles.
    pub cycles: u64,
    /// Times the watchdog fired; a cycle can count more than once.
    pub watchdog_fires: u64,
    /// Stopped by an operator interrupt rather than the time budget.
    pub interrupted: bool,
}
