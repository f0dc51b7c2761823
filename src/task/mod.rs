// src/task/mod.rs

//! Command tasks: one configured unit of work bound to one device.
//!
//! Every strategy implements [`CommandTask`]:
//!
//! - [`OneShot`]: run once (end-of-run summaries).
//! - [`PollingLoop`]: run every cycle, append a timestamped block.
//! - [`StatefulDiff`]: cheap probe every cycle, heavy capture on change.
//! - [`ArtifactPull`]: periodically produce and pull a remote file.
//! - [`Durable`]: a long-running process restarted only when it stopped.
//!
//! Tasks are built from a [`CommandTable`] by [`instantiate`], once per
//! (device, command) pair; no state is shared between devices.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::device::{ProcessExit, Session};
use crate::errors::{DevprobeError, Result};

pub mod artifact;
pub mod catalog;
pub mod diff;
pub mod durable;
pub mod one_shot;
pub mod polling;
pub mod slot;
pub mod template;

pub use artifact::{ArtifactPull, PullPhase, PullSchedule};
pub use catalog::{instantiate, CommandTable, DEFAULT_COMMANDS};
pub use diff::{ChangeDetector, StatefulDiff};
pub use durable::Durable;
pub use one_shot::OneShot;
pub use polling::PollingLoop;
pub use slot::ProcessSlot;
pub use template::{render, TaskParams};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A recurring or one-shot unit of work against one [`Session`].
pub trait CommandTask: Send + fmt::Debug {
    /// Log name of the task (base name of its files).
    fn name(&self) -> &str;

    fn session(&self) -> &Session;

    /// Processes currently in flight for this task.
    fn slot(&self) -> &ProcessSlot;

    /// Do this cycle's work.
    fn execute(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Teardown work; also used by some strategies before a restart.
    fn clean(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Forcibly stop anything in flight. Idempotent.
    fn kill(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.slot().kill())
    }

    fn is_idle(&self) -> bool {
        self.slot().is_idle()
    }
}

/// Run `command` on the session, tracking the process in `slot` so it can be
/// killed while we wait for it.
///
/// A killed process still yields whatever it printed.
pub(crate) async fn run_tracked(
    session: &Session,
    slot: &ProcessSlot,
    command: &str,
) -> Result<ProcessExit> {
    let handle = session.shell(command, None)?;
    slot.track(&handle);
    Ok(session.capture_exit(handle).await)
}

/// One step of a multi-step `execute`: like [`run_tracked`], but a killed
/// process is a [`DevprobeError::Killed`] so the caller stops there.
pub(crate) async fn run_step(
    session: &Session,
    slot: &ProcessSlot,
    command: &str,
) -> Result<(String, i32)> {
    let exit = run_tracked(session, slot, command).await?;
    if exit.killed {
        return Err(DevprobeError::Killed(command.to_string()));
    }
    Ok((exit.output, exit.code))
}
