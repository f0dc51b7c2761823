// src/device/process.rs

//! Supervised child processes.
//!
//! Every command runs inside its own Tokio task that owns the `Child`.
//! That task either sees the process exit on its own, or receives a kill
//! request through [`ProcessControl`] and terminates it. Either way it
//! publishes the exit through a `watch` flag (so any number of observers can
//! ask "is it still running?") and hands the captured stdout to the single
//! [`ProcessHandle`] owner.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::Result;

/// Exit code reported for processes that were killed, or whose status could
/// not be read.
pub const KILLED_EXIT_CODE: i32 = -1;

/// How long to keep reading stdout after the process itself has exited.
///
/// A grandchild that inherited the pipe can keep it open indefinitely.
const STDOUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Final state of a supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Raw stdout (empty when stdout was redirected to a file).
    pub output: String,
    pub code: i32,
    /// True if the process was terminated through [`ProcessControl::kill`]
    /// or [`ProcessControl::cancel`].
    pub killed: bool,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Cloneable remote control for a running process.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    label: Arc<str>,
    cancel: Arc<Notify>,
    exited: watch::Receiver<bool>,
}

impl ProcessControl {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_running(&self) -> bool {
        !*self.exited.borrow()
    }

    /// Kill the process and wait until it has actually exited.
    ///
    /// No-op if it already exited; safe to call any number of times.
    pub async fn kill(&self) {
        if !self.is_running() {
            return;
        }
        self.cancel();
        self.wait().await;
    }

    /// Ask for the process to be killed without waiting for it.
    ///
    /// The request is kept if the supervisor is not listening yet.
    pub fn cancel(&self) {
        if self.is_running() {
            debug!(process = %self.label, "kill requested");
            self.cancel.notify_one();
        }
    }

    /// Wait for the process to exit without interfering with it.
    pub async fn wait(&self) {
        let mut exited = self.exited.clone();
        // An error means the supervisor is gone, which also means exited.
        let _ = exited.wait_for(|done| *done).await;
    }
}

/// Owner side of a spawned process: yields its [`ProcessExit`].
#[derive(Debug)]
pub struct ProcessHandle {
    control: ProcessControl,
    exit: oneshot::Receiver<ProcessExit>,
}

impl ProcessHandle {
    pub fn control(&self) -> ProcessControl {
        self.control.clone()
    }

    /// Wait for the process to finish (or be killed).
    pub async fn wait(self) -> ProcessExit {
        self.exit.await.unwrap_or(ProcessExit {
            output: String::new(),
            code: KILLED_EXIT_CODE,
            killed: true,
        })
    }
}

/// Spawn `cmd` under supervision.
///
/// With `redirect`, stdout is appended to that file instead of being
/// captured. Stderr is always drained and logged at debug.
pub fn spawn(
    mut cmd: Command,
    label: impl Into<String>,
    redirect: Option<&Path>,
) -> Result<ProcessHandle> {
    let label: Arc<str> = Arc::from(label.into());

    match redirect {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening redirect file {:?}", path))?;
            cmd.stdout(Stdio::from(file));
        }
        None => {
            cmd.stdout(Stdio::piped());
        }
    }

    cmd.stdin(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process `{}`", label))?;

    debug!(process = %label, pid = child.id(), "process started");

    if let Some(stderr) = child.stderr.take() {
        let label = Arc::clone(&label);
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(process = %label, "stderr: {}", line);
            }
        });
    }

    let buffer = Arc::new(Mutex::new(Vec::new()));
    let reader = child
        .stdout
        .take()
        .map(|stdout| spawn_stdout_reader(stdout, Arc::clone(&buffer)));

    let (exited_tx, exited_rx) = watch::channel(false);
    let (exit_tx, exit_rx) = oneshot::channel();
    let cancel = Arc::new(Notify::new());

    let control = ProcessControl {
        label: Arc::clone(&label),
        cancel: Arc::clone(&cancel),
        exited: exited_rx,
    };

    tokio::spawn(async move {
        let (code, killed) = supervise(&mut child, &cancel, &label).await;

        if let Some(reader) = reader {
            if killed {
                reader.abort();
            } else if tokio::time::timeout(STDOUT_DRAIN_GRACE, reader).await.is_err() {
                debug!(process = %label, "stdout still open after exit; dropping the rest");
            }
        }

        let output = {
            let mut bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&std::mem::take(&mut *bytes)).into_owned()
        };

        let _ = exited_tx.send(true);
        let _ = exit_tx.send(ProcessExit {
            output,
            code,
            killed,
        });
    });

    Ok(ProcessHandle {
        control,
        exit: exit_rx,
    })
}

/// Wait for exit or a kill request, whichever comes first.
async fn supervise(child: &mut Child, cancel: &Notify, label: &str) -> (i32, bool) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                let code = status.code().unwrap_or(KILLED_EXIT_CODE);
                debug!(process = %label, exit_code = code, "process exited");
                (code, false)
            }
            Err(e) => {
                warn!(process = %label, error = %e, "failed to wait for process");
                (KILLED_EXIT_CODE, false)
            }
        },

        _ = cancel.notified() => {
            info!(process = %label, "killing process");
            if let Err(e) = child.kill().await {
                warn!(process = %label, error = %e, "failed to kill process");
            }
            (KILLED_EXIT_CODE, true)
        }
    }
}

fn spawn_stdout_reader(mut stdout: ChildStdout, buffer: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]),
            }
        }
    })
}
