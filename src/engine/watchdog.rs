// src/engine/watchdog.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::task::ProcessSlot;

/// One-shot deadline for a cycle.
///
/// Runs as its own Tokio task, so it fires even while the loop is suspended
/// on a hung process. Firing fences the slots of *every* task it was armed
/// with, not only the one that hung: their processes are killed, and so is
/// anything they start until the watchdog is disarmed.
#[derive(Debug)]
pub struct Watchdog {
    targets: Vec<ProcessSlot>,
    fired: Arc<AtomicBool>,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    pub fn arm(timeout: Duration, targets: Vec<ProcessSlot>) -> Self {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        for slot in &targets {
            slot.unfence();
        }
        let fenced = targets.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(timeout) => {
                    error!(timeout_secs = timeout.as_secs_f64(), "watchdog timeout; killing all commands");
                    flag.store(true, Ordering::SeqCst);
                    for slot in &fenced {
                        slot.fence().await;
                    }
                    true
                }
                _ = cancel_rx => false,
            }
        });
        debug!(timeout_secs = timeout.as_secs_f64(), "watchdog armed");

        Self {
            targets,
            fired,
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Whether the deadline has passed. Kills may still be in progress.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the timer. Returns true if it had already fired.
    ///
    /// If it fired, this waits until all its kills are done, so nothing it
    /// targeted is still running when this returns. The slots accept new
    /// processes again afterwards.
    pub async fn disarm(mut self) -> bool {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        let fired = match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(false),
            None => false,
        };
        self.unfence();
        debug!(fired, "watchdog disarmed");
        fired
    }

    fn unfence(&self) {
        for slot in &self.targets {
            slot.unfence();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.unfence();
    }
}
