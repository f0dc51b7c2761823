// src/task/slot.rs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::device::{ProcessControl, ProcessHandle};

/// The processes a task currently has in flight.
///
/// Shared between the task and the watchdog: the watchdog holds a clone and
/// can kill everything in it while the task itself is suspended waiting on
/// one of those processes.
///
/// A fenced slot kills every process tracked into it until it is unfenced,
/// so a multi-step task cannot start its next step unbounded after the
/// watchdog has already fired.
#[derive(Debug, Clone, Default)]
pub struct ProcessSlot {
    tracked: Arc<Mutex<Tracked>>,
}

#[derive(Debug, Default)]
struct Tracked {
    controls: Vec<ProcessControl>,
    fenced: bool,
}

impl ProcessSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `handle`'s process; exited entries are dropped.
    ///
    /// If the slot is fenced the process is killed straight away.
    pub fn track(&self, handle: &ProcessHandle) {
        let control = handle.control();
        let mut tracked = self.lock();
        tracked.controls.retain(ProcessControl::is_running);
        if tracked.fenced {
            debug!(process = %control.label(), "slot fenced; killing new process");
            control.cancel();
        }
        tracked.controls.push(control);
    }

    /// Number of tracked processes still running.
    pub fn running(&self) -> usize {
        self.lock().controls.iter().filter(|c| c.is_running()).count()
    }

    pub fn is_idle(&self) -> bool {
        self.running() == 0
    }

    pub fn is_fenced(&self) -> bool {
        self.lock().fenced
    }

    /// Kill every tracked process and wait for each to exit.
    pub async fn kill(&self) {
        let controls = self.lock().controls.clone();
        for control in controls {
            control.kill().await;
        }
    }

    /// Refuse new processes until [`unfence`](Self::unfence), then kill
    /// everything already tracked.
    pub async fn fence(&self) {
        let controls = {
            let mut tracked = self.lock();
            tracked.fenced = true;
            tracked.controls.clone()
        };
        for control in controls {
            control.kill().await;
        }
    }

    pub fn unfence(&self) {
        self.lock().fenced = false;
    }

    fn lock(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
