// src/task/one_shot.rs

use tracing::debug;

use crate::device::Session;
use crate::errors::Result;
use crate::layout;
use crate::task::{run_tracked, BoxFuture, CommandTask, ProcessSlot};

/// Runs its command once and appends the output to `<name>.txt`.
///
/// Used for end-of-run summaries such as a bug report. Later calls to
/// `execute` on the same instance do nothing.
#[derive(Debug)]
pub struct OneShot {
    name: String,
    command: String,
    session: Session,
    slot: ProcessSlot,
    done: bool,
}

impl OneShot {
    pub fn new(name: impl Into<String>, command: impl Into<String>, session: Session) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            session,
            slot: ProcessSlot::new(),
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    async fn run(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        debug!(device = %self.session.id(), task = %self.name, command = %self.command, "execute single command");
        let exit = run_tracked(&self.session, &self.slot, &self.command).await?;
        let path = layout::log_file(self.session.log_dir(), &self.name);
        layout::append(&path, &format!("{}\n", exit.output))?;
        Ok(())
    }
}

impl CommandTask for OneShot {
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
        Box::pin(self.run())
    }
}
