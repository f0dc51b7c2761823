// src/task/durable.rs

use chrono::Local;
use tracing::{debug, info, warn};

use crate::device::Session;
use crate::errors::Result;
use crate::layout;
use crate::task::{run_step, BoxFuture, CommandTask, ProcessSlot};

/// One long-running process (a log stream, a stress driver) kept alive
/// across cycles.
///
/// ```text
/// NotStarted -> Running -> (exited or killed) -> Running -> ... -> Killed
/// ```
///
/// `execute` only starts a process when none is running; each start streams
/// into a fresh `<name>_<timestamp>.txt`.
#[derive(Debug)]
pub struct Durable {
    name: String,
    command: String,
    clean: Option<String>,
    setup: Option<String>,
    session: Session,
    slot: ProcessSlot,
    starts: u64,
}

impl Durable {
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        clean: Option<String>,
        setup: Option<String>,
        session: Session,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            clean,
            setup,
            session,
            slot: ProcessSlot::new(),
            starts: 0,
        }
    }

    /// How many times the process has been (re)started.
    pub fn starts(&self) -> u64 {
        self.starts
    }

    async fn ensure_running(&mut self) -> Result<()> {
        if !self.slot.is_idle() {
            debug!(device = %self.session.id(), task = %self.name, "durable command still running");
            return Ok(());
        }

        if self.starts == 0 {
            if let Some(setup) = &self.setup {
                debug!(device = %self.session.id(), task = %self.name, command = %setup, "execute durable setup command");
                run_step(&self.session, &self.slot, setup).await?;
            }
        }

        self.stop().await?;

        let path = layout::stamped_file(self.session.log_dir(), &self.name, "txt", Local::now());
        info!(device = %self.session.id(), task = %self.name, file = ?path, "start durable command");

        let handle = self.session.shell(&self.command, Some(&path))?;
        self.slot.track(&handle);
        self.starts += 1;

        let device = self.session.id().clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            let exit = handle.wait().await;
            if exit.killed {
                debug!(device = %device, task = %name, "durable command killed");
            } else {
                warn!(device = %device, task = %name, exit_code = exit.code, "durable command exited");
            }
        });

        Ok(())
    }

    /// Run the remote cleanup command, then make sure the local process is
    /// gone before returning.
    async fn stop(&mut self) -> Result<()> {
        let cleaned = match &self.clean {
            Some(clean) => {
                debug!(device = %self.session.id(), task = %self.name, command = %clean, "execute durable clean command");
                run_step(&self.session, &self.slot, clean).await.map(|_| ())
            }
            None => Ok(()),
        };
        self.slot.kill().await;
        cleaned
    }
}

impl CommandTask for Durable {
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
        Box::pin(self.ensure_running())
    }

    fn clean(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stop())
    }
}
