// src/task/artifact.rs

use std::ffi::OsStr;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::device::Session;
use crate::errors::{DevprobeError, Result};
use crate::layout;
use crate::task::{run_step, BoxFuture, CommandTask, ProcessSlot};

/// Smallest pull delay (in cycles) for which the trigger recurs after the
/// counter resets.
pub const MIN_PULL_DELAY: u64 = 3;

/// What the artifact task does on a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPhase {
    Idle,
    /// Ask the device to start producing the artifact.
    Trigger,
    /// Copy the finished artifact to local storage.
    Pull,
}

/// Cycle counter driving [`ArtifactPull`].
///
/// The trigger fires two cycles before the pull so the device has time to
/// finish writing the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullSchedule {
    delay: u64,
    counter: u64,
}

impl PullSchedule {
    /// Delay derived from a real-time period and the cycle interval.
    pub fn new(period: Duration, interval: Duration) -> Self {
        let delay = match interval.as_millis() {
            0 => MIN_PULL_DELAY,
            millis => (period.as_millis() / millis) as u64,
        };
        Self::with_delay(delay)
    }

    pub fn with_delay(delay: u64) -> Self {
        Self {
            delay: delay.max(MIN_PULL_DELAY),
            counter: 0,
        }
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Advance one cycle.
    pub fn tick(&mut self) -> PullPhase {
        let phase = if self.counter == self.delay - 2 {
            PullPhase::Trigger
        } else if self.counter == self.delay {
            self.counter = 0;
            PullPhase::Pull
        } else {
            PullPhase::Idle
        };
        self.counter += 1;
        phase
    }
}

/// Periodically has the device produce an artifact (e.g. a heap dump) and
/// pulls it to `<name>_<timestamp>.<ext>`.
#[derive(Debug)]
pub struct ArtifactPull {
    name: String,
    trigger: String,
    clean: Option<String>,
    remote: String,
    extension: String,
    session: Session,
    slot: ProcessSlot,
    schedule: PullSchedule,
}

impl ArtifactPull {
    pub fn new(
        name: impl Into<String>,
        trigger: impl Into<String>,
        clean: Option<String>,
        remote: impl Into<String>,
        extension: impl Into<String>,
        schedule: PullSchedule,
        session: Session,
    ) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            clean,
            remote: remote.into(),
            extension: extension.into(),
            session,
            slot: ProcessSlot::new(),
            schedule,
        }
    }

    pub fn schedule(&self) -> &PullSchedule {
        &self.schedule
    }

    async fn step(&mut self) -> Result<()> {
        match self.schedule.tick() {
            PullPhase::Idle => Ok(()),
            PullPhase::Trigger => self.start_artifact().await,
            PullPhase::Pull => self.pull().await,
        }
    }

    async fn start_artifact(&self) -> Result<()> {
        debug!(device = %self.session.id(), task = %self.name, command = %self.trigger, "trigger artifact");
        self.remove_stale().await?;
        let (output, code) = run_step(&self.session, &self.slot, &self.trigger).await?;
        if code != 0 {
            warn!(device = %self.session.id(), task = %self.name, exit_code = code, output = %output, "artifact trigger failed");
        }
        Ok(())
    }

    async fn pull(&self) -> Result<()> {
        let local = layout::stamped_file(
            self.session.log_dir(),
            &self.name,
            &self.extension,
            Local::now(),
        );
        info!(device = %self.session.id(), task = %self.name, remote = %self.remote, local = ?local, "pull artifact");

        let handle = self.session.host([
            OsStr::new("pull"),
            OsStr::new(&self.remote),
            local.as_os_str(),
        ])?;
        self.slot.track(&handle);
        let exit = self.session.capture_exit(handle).await;
        debug!(device = %self.session.id(), task = %self.name, "{}", exit.output);

        if exit.killed {
            return Err(DevprobeError::Killed(format!("pull {}", self.remote)));
        }
        if exit.code != 0 {
            return Err(DevprobeError::CommandFailure {
                command: format!("pull {}", self.remote),
                code: exit.code,
            });
        }
        Ok(())
    }

    async fn remove_stale(&self) -> Result<()> {
        if let Some(clean) = &self.clean {
            debug!(device = %self.session.id(), task = %self.name, command = %clean, "execute artifact clean command");
            run_step(&self.session, &self.slot, clean).await?;
        }
        Ok(())
    }
}

impl CommandTask for ArtifactPull {
    fn name(&self) -> &str {
        &self.name
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn slot(&self) -> &ProcessSlot {
        &self.slot
    }

    fn execute(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.step())
    }

    fn clean(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.remove_stale())
    }
}
