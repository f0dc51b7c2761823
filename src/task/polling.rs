// src/task/polling.rs

use chrono::Local;
use tracing::debug;

use crate::device::Session;
use crate::errors::Result;
use crate::layout;
use crate::task::{run_tracked, BoxFuture, CommandTask, ProcessSlot};

/// Default periodic sampler: every cycle, run the command and append a
/// `>>timestamp>>` block to `<name>.txt`.
#[derive(Debug)]
pub struct PollingLoop {
    name: String,
    command: String,
    session: Session,
    slot: ProcessSlot,
}

impl PollingLoop {
    pub fn new(name: impl Into<String>, command: impl Into<String>, session: Session) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            session,
            slot: ProcessSlot::new(),
        }
    }

    async fn sample(&mut self) -> Result<()> {
        debug!(device = %self.session.id(), task = %self.name, command = %self.command, "execute loop command");
        let exit = run_tracked(&self.session, &self.slot, &self.command).await?;
        let path = layout::log_file(self.session.log_dir(), &self.name);
        layout::append_block(&path, Local::now(), &exit.output)
    }
}

impl CommandTask for PollingLoop {
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
        Box::pin(self.sample())
    }
}
