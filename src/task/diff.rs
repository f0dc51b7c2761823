// src/task/diff.rs

use chrono::Local;
use tracing::{debug, info};

use crate::device::Session;
use crate::errors::Result;
use crate::layout;
use crate::task::{run_step, BoxFuture, CommandTask, ProcessSlot};

/// Remembers the last probe output and reports transitions.
///
/// The first observation only sets the baseline. Empty output is an
/// ordinary value: `A -> ""` is a transition, `"" -> ""` is not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDetector {
    baseline: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sample`; true if it differs from the previous one.
    pub fn observe(&mut self, sample: &str) -> bool {
        match &self.baseline {
            None => {
                self.baseline = Some(sample.to_string());
                false
            }
            Some(previous) if previous == sample => false,
            Some(_) => {
                self.baseline = Some(sample.to_string());
                true
            }
        }
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }
}

/// Cheap probe every cycle, expensive capture only when the probe output
/// changes (e.g. `ls -l` on a crash trace file, then `cat` it).
#[derive(Debug)]
pub struct StatefulDiff {
    name: String,
    probe: String,
    capture: String,
    session: Session,
    slot: ProcessSlot,
    detector: ChangeDetector,
}

impl StatefulDiff {
    pub fn new(
        name: impl Into<String>,
        probe: impl Into<String>,
        capture: impl Into<String>,
        session: Session,
    ) -> Self {
        Self {
            name: name.into(),
            probe: probe.into(),
            capture: capture.into(),
            session,
            slot: ProcessSlot::new(),
            detector: ChangeDetector::new(),
        }
    }

    async fn poll(&mut self) -> Result<()> {
        debug!(device = %self.session.id(), task = %self.name, probe = %self.probe, "execute diff probe");
        let (sample, _code) = run_step(&self.session, &self.slot, &self.probe).await?;

        if !self.detector.observe(&sample) {
            return Ok(());
        }

        let path = layout::stamped_file(self.session.log_dir(), &self.name, "txt", Local::now());
        info!(device = %self.session.id(), task = %self.name, file = ?path, "state changed; capturing");

        let (output, _code) = run_step(&self.session, &self.slot, &self.capture).await?;
        std::fs::write(&path, output)?;
        Ok(())
    }
}

impl CommandTask for StatefulDiff {
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
        Box::pin(self.poll())
    }
}
