// src/device/session.rs

//! One device's connection and the shell primitives built on it.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::device::process::{self, ProcessExit, ProcessHandle};
use crate::device::transport::Adb;
use crate::errors::{DevprobeError, Result};

/// Query used to count processing units on the device.
const CPU_QUERY: &str = "ls /sys/devices/system/cpu/";

static CPU_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cpu\d+$").expect("valid cpu entry regex"));

/// Device address as given by the operator.
///
/// Anything that looks like a host (`192.168.1.20`, `host:5555`) is reached
/// through `adb connect`; everything else is treated as a locally attached
/// serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_network(&self) -> bool {
        self.0.contains('.') || self.0.contains(':')
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Unauthorized,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Pause before re-checking a device that reported `unauthorized`.
    pub auth_backoff: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auth_backoff: Duration::from_secs(1),
        }
    }
}

/// A managed connection to one device.
///
/// Cloning is cheap; all clones share the connection state, so a reconnect
/// triggered through one clone is visible to every task of the device.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: DeviceId,
    log_dir: PathBuf,
    adb: Adb,
    options: SessionOptions,
    link: Mutex<Link>,
    core_count: OnceCell<usize>,
    reconnect_requests: AtomicU64,
}

#[derive(Debug)]
struct Link {
    address: String,
    state: ConnectionState,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("log_dir", &self.inner.log_dir)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Build a disconnected session. No IO happens here.
    pub fn new(id: DeviceId, log_dir: PathBuf, adb: Adb, options: SessionOptions) -> Self {
        let address = id.as_str().to_string();
        Self {
            inner: Arc::new(SessionInner {
                id,
                log_dir,
                adb,
                options,
                link: Mutex::new(Link {
                    address,
                    state: ConnectionState::Disconnected,
                }),
                core_count: OnceCell::new(),
                reconnect_requests: AtomicU64::new(0),
            }),
        }
    }

    /// Setup-time constructor: create `<run_dir>/<device>/`, connect, and
    /// record the core count for the reporting side.
    pub async fn open(
        id: DeviceId,
        run_dir: &Path,
        adb: Adb,
        options: SessionOptions,
    ) -> Result<Self> {
        let log_dir = run_dir.join(id.as_str());
        if !log_dir.is_dir() {
            info!(dir = ?log_dir, "create device dir");
            std::fs::create_dir_all(&log_dir)?;
        }

        let session = Session::new(id, log_dir, adb, options);
        session.connect().await?;

        let cores = session.core_count().await;
        std::fs::write(session.log_dir().join("corenum.txt"), cores.to_string())?;

        Ok(session)
    }

    pub fn id(&self) -> &DeviceId {
        &self.inner.id
    }

    pub fn log_dir(&self) -> &Path {
        &self.inner.log_dir
    }

    pub fn address(&self) -> String {
        self.link().address.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.link().state
    }

    /// How many reconnects failing captures have asked for so far.
    pub fn reconnect_requests(&self) -> u64 {
        self.inner.reconnect_requests.load(Ordering::SeqCst)
    }

    /// Resolve the device to a live transport address.
    pub async fn connect(&self) -> Result<()> {
        let id = &self.inner.id;
        if !id.is_network() {
            self.set_link(Some(id.as_str().to_string()), ConnectionState::Connected);
            return Ok(());
        }

        self.set_link(None, ConnectionState::Connecting);
        let output = self.run_host(&["connect", id.as_str()]).await?;
        info!(device = %id, "{}", output);

        if !output.contains("connected to") {
            self.set_link(None, ConnectionState::Disconnected);
            return Err(DevprobeError::Connection {
                device: id.to_string(),
                reason: output,
            });
        }

        let address = output
            .split_whitespace()
            .last()
            .unwrap_or(id.as_str())
            .to_string();
        self.set_link(Some(address), ConnectionState::Connecting);

        self.check_online().await
    }

    /// `adb disconnect` + `adb connect`; failures are logged, not returned.
    pub async fn reconnect(&self) {
        let id = &self.inner.id;
        if !id.is_network() {
            debug!(device = %id, "serial device; nothing to reconnect");
            return;
        }

        error!(device = %id, "command failed; trying to reconnect");
        self.set_link(None, ConnectionState::Connecting);

        if let Err(e) = self.run_host(&["disconnect", id.as_str()]).await {
            warn!(device = %id, error = %e, "disconnect failed");
        }

        match self.run_host(&["connect", id.as_str()]).await {
            Ok(output) if output.contains("connected to") => {
                let address = output.split_whitespace().last().map(str::to_string);
                self.set_link(address, ConnectionState::Connected);
                info!(device = %id, "{}", output);
            }
            Ok(output) => {
                self.set_link(None, ConnectionState::Disconnected);
                warn!(device = %id, output = %output, "reconnect failed");
            }
            Err(e) => {
                self.set_link(None, ConnectionState::Disconnected);
                warn!(device = %id, error = %e, "reconnect failed");
            }
        }
    }

    /// Start `command` on the device.
    ///
    /// With `redirect`, stdout is appended to that file as it is produced.
    pub fn shell(&self, command: &str, redirect: Option<&Path>) -> Result<ProcessHandle> {
        debug!(device = %self.inner.id, command, "shell");
        let cmd = self.inner.adb.shell_command(&self.address(), command);
        process::spawn(cmd, format!("{}: {}", self.inner.id, command), redirect)
    }

    /// Start a host-side `adb -s <address> <args...>` command (e.g. `pull`).
    pub fn host<I, S>(&self, args: I) -> Result<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let label = args
            .iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(device = %self.inner.id, command = %label, "adb");
        let cmd = self.inner.adb.device_command(&self.address(), args);
        process::spawn(cmd, format!("{}: adb {}", self.inner.id, label), None)
    }

    /// Wait for `handle` and return its normalised output and exit code.
    ///
    /// A failing exit schedules one background reconnect; the result is
    /// returned either way.
    pub async fn capture(&self, handle: ProcessHandle) -> (String, i32) {
        let exit = self.capture_exit(handle).await;
        (exit.output, exit.code)
    }

    /// Like [`capture`](Self::capture), but keeps the whole [`ProcessExit`]
    /// so callers can tell a killed process from one that exited.
    pub async fn capture_exit(&self, handle: ProcessHandle) -> ProcessExit {
        let mut exit = handle.wait().await;
        debug!(device = %self.inner.id, exit_code = exit.code, killed = exit.killed, "captured");

        if !exit.success() {
            self.inner.reconnect_requests.fetch_add(1, Ordering::SeqCst);
            let session = self.clone();
            tokio::spawn(async move {
                session.reconnect().await;
            });
        }

        exit.output = normalize_output(&exit.output);
        exit
    }

    /// Run `query` once and parse a fact from its output, falling back when
    /// nothing could be parsed.
    pub async fn environment_fact<T, F>(&self, query: &str, parse: F, fallback: T) -> T
    where
        F: FnOnce(&str) -> Option<T>,
    {
        let output = match self.shell(query, None) {
            Ok(handle) => self.capture(handle).await.0,
            Err(e) => {
                warn!(device = %self.inner.id, query, error = %e, "environment query failed");
                return fallback;
            }
        };
        parse(&output).unwrap_or(fallback)
    }

    /// Number of CPU cores on the device (1 if it cannot be determined).
    ///
    /// Queried once per session; later calls return the cached value.
    pub async fn core_count(&self) -> usize {
        *self
            .inner
            .core_count
            .get_or_init(|| async {
                let cores = self
                    .environment_fact(CPU_QUERY, count_cpu_entries, 0)
                    .await;
                if cores == 0 {
                    error!(device = %self.inner.id, "get CPU core number failed, set core number to 1");
                    1
                } else {
                    info!(device = %self.inner.id, cores, "CPU core number");
                    cores
                }
            })
            .await
    }

    async fn check_online(&self) -> Result<()> {
        let id = &self.inner.id;
        let mut retried = false;

        loop {
            let listing = self.run_host(&["devices"]).await?;
            match device_status(&listing, id.as_str()) {
                Some("device") => {
                    self.set_link(None, ConnectionState::Connected);
                    info!(device = %id, address = %self.address(), "device online");
                    return Ok(());
                }
                Some("unauthorized") if !retried => {
                    self.set_link(None, ConnectionState::Unauthorized);
                    warn!(device = %id, "device unauthorized; checking again");
                    tokio::time::sleep(self.inner.options.auth_backoff).await;
                    retried = true;
                }
                Some("unauthorized") => {
                    self.set_link(None, ConnectionState::Unauthorized);
                    return Err(DevprobeError::Authorization(id.to_string()));
                }
                other => {
                    self.set_link(None, ConnectionState::Disconnected);
                    let reason = match other {
                        Some(state) => format!("device is {state}"),
                        None => "device not listed by `adb devices`".to_string(),
                    };
                    error!(device = %id, reason = %reason, "device not online");
                    return Err(DevprobeError::Connection {
                        device: id.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    /// Run an `adb` host command to completion; exit status is not judged
    /// here and never triggers a reconnect.
    async fn run_host(&self, args: &[&str]) -> Result<String> {
        let label = format!("adb {}", args.join(" "));
        let handle = process::spawn(self.inner.adb.host_command(args), label, None)?;
        let exit = handle.wait().await;
        Ok(normalize_output(&exit.output))
    }

    fn link(&self) -> std::sync::MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_link(&self, address: Option<String>, state: ConnectionState) {
        let mut link = self.link();
        if let Some(address) = address {
            link.address = address;
        }
        link.state = state;
    }
}

/// Strip the carriage-return artifacts adb adds and trim the result.
pub fn normalize_output(raw: &str) -> String {
    raw.replace("\r\r", "")
        .replace("\r\n", "\n")
        .trim()
        .to_string()
}

/// State column of the single `adb devices` line that mentions `id`.
///
/// `None` if the device is missing or listed more than once.
pub fn device_status<'a>(listing: &'a str, id: &str) -> Option<&'a str> {
    let mut lines = listing
        .lines()
        .filter(|line| !line.starts_with("List of devices") && line.contains(id));
    let line = lines.next()?;
    if lines.next().is_some() {
        return None;
    }
    line.split_whitespace().nth(1)
}

/// Count `cpuN` entries in a `/sys/devices/system/cpu/` listing.
pub fn count_cpu_entries(listing: &str) -> Option<usize> {
    let count = listing
        .split_whitespace()
        .filter(|entry| CPU_ENTRY.is_match(entry))
        .count();
    (count > 0).then_some(count)
}
