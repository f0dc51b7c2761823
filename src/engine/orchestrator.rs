// src/engine/orchestrator.rs

use std::fmt;
use std::future::Future;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::device::Session;
use crate::errors::{DevprobeError, Result};
use crate::task::{instantiate, CommandTable, CommandTask, ProcessSlot, TaskParams};

use super::{RunOptions, RunSummary, Schedule, Watchdog};

/// Drives every (device × command) task through the collection loop.
///
/// ```text
/// build -> cycle* -> [interrupt: kill all] -> clean all -> final tasks
/// ```
///
/// A cycle executes the tasks one at a time, device-major, under a watchdog
/// deadline. A failing task is logged and the cycle moves on. When the
/// deadline fires, the tasks not yet run get a fresh deadline sized for
/// what is left, so one hung device cannot starve the others.
pub struct Orchestrator {
    tasks: Vec<Box<dyn CommandTask>>,
    finals: Vec<Box<dyn CommandTask>>,
    options: RunOptions,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tasks", &self.tasks.len())
            .field("finals", &self.finals.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Orchestrator {
    /// Instantiate `selected` against every session.
    ///
    /// Names missing from `table` are a configuration error. A pair whose
    /// template cannot be rendered (say `{process}` with no process given) is
    /// skipped with a warning.
    pub fn build(
        sessions: &[Session],
        table: &CommandTable,
        selected: &[String],
        params: &TaskParams,
        options: RunOptions,
    ) -> Result<Self> {
        let mut tasks = Vec::new();
        let mut finals = Vec::new();

        for session in sessions {
            for key in selected {
                let spec = table.get(key).ok_or_else(|| {
                    DevprobeError::Configuration(format!("unknown command '{key}'"))
                })?;

                match instantiate(key, spec, session, params, options.interval) {
                    Ok(task) if spec.is_final() => finals.push(task),
                    Ok(task) => tasks.push(task),
                    Err(DevprobeError::Configuration(reason)) => {
                        warn!(device = %session.id(), command = %key, %reason, "skip command");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        debug!(tasks = tasks.len(), finals = finals.len(), "orchestrator built");
        Ok(Self::from_tasks(tasks, finals, options))
    }

    /// Assemble from already-built tasks.
    pub fn from_tasks(
        tasks: Vec<Box<dyn CommandTask>>,
        finals: Vec<Box<dyn CommandTask>>,
        options: RunOptions,
    ) -> Self {
        Self {
            tasks,
            finals,
            options,
        }
    }

    pub fn tasks(&self) -> &[Box<dyn CommandTask>] {
        &self.tasks
    }

    pub fn finals(&self) -> &[Box<dyn CommandTask>] {
        &self.finals
    }

    /// Run until the time budget is spent or `shutdown` resolves, then tear
    /// down.
    ///
    /// An interrupt preempts the cycle in progress; everything in flight is
    /// killed before the clean-up and the final tasks run.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        info!(
            tasks = self.tasks.len(),
            interval_secs = self.options.interval.as_secs_f64(),
            total_secs = self.options.total.map(|t| t.as_secs_f64()),
            "collection started"
        );

        let mut summary = RunSummary::default();

        let interrupted = tokio::select! {
            _ = drive(&mut self.tasks, self.options, &mut summary) => false,
            _ = shutdown => true,
        };
        summary.interrupted = interrupted;

        if interrupted {
            info!(cycles = summary.cycles, "interrupted; stopping all commands");
            for task in &self.tasks {
                task.kill().await;
            }
        } else {
            info!(cycles = summary.cycles, "time budget spent");
        }

        self.teardown().await;

        info!(
            cycles = summary.cycles,
            watchdog_fires = summary.watchdog_fires,
            "collection finished"
        );
        Ok(summary)
    }

    async fn teardown(&mut self) {
        for task in &mut self.tasks {
            if let Err(e) = task.clean().await {
                warn!(device = %task.session().id(), task = %task.name(), error = %e, "clean failed");
            }
        }

        for task in &mut self.finals {
            info!(device = %task.session().id(), task = %task.name(), "run final command");
            if let Err(e) = task.execute().await {
                error!(device = %task.session().id(), task = %task.name(), error = %e, "final command failed");
            }
        }
    }
}

async fn drive(tasks: &mut [Box<dyn CommandTask>], options: RunOptions, summary: &mut RunSummary) {
    let mut schedule = Schedule::new(options.interval, options.total);
    let count = tasks.len();
    let timeout = options.watchdog.timeout_for(count);
    let slots: Vec<ProcessSlot> = tasks.iter().map(|t| t.slot().clone()).collect();

    while schedule.has_remaining() {
        let started = Instant::now();
        debug!(
            cycle = summary.cycles + 1,
            remaining_secs = schedule.remaining().map(|r| r.as_secs_f64()),
            "cycle start"
        );

        let mut watchdog = Watchdog::arm(timeout, slots.clone());
        for (index, task) in tasks.iter_mut().enumerate() {
            if watchdog.has_fired() {
                if watchdog.disarm().await {
                    summary.watchdog_fires += 1;
                }
                let remaining = count - index;
                warn!(task = %task.name(), remaining, "watchdog fired; re-arming for the rest of this cycle");
                watchdog = Watchdog::arm(options.watchdog.timeout_for(remaining), slots.clone());
            }
            if let Err(e) = task.execute().await {
                warn!(device = %task.session().id(), task = %task.name(), error = %e, "command failed");
            }
        }
        if watchdog.disarm().await {
            summary.watchdog_fires += 1;
        }

        summary.cycles += 1;
        let pause = schedule.complete_cycle(started.elapsed());
        if !schedule.has_remaining() {
            break;
        }
        debug!(sleep_secs = pause.as_secs_f64(), "cycle done");
        sleep(pause).await;
    }
}
