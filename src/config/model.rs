// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::device::{DeviceId, SessionOptions};
use crate::engine::WatchdogTiming;
use crate::task::catalog::{MONKEY_PCT_DEFAULTS, MONKEY_SCRIPT_HEADER};
use crate::task::{CommandTable, TaskParams};

/// Line separator written into on-device files through `echo '...'`.
const REMOTE_NEWLINE: &str = "\\n";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [run]
/// devices = ["192.168.1.20"]
/// commands = ["top", "meminfo", "battery"]
/// interval = 10
///
/// [monkey]
/// packages = ["com.example.app"]
///
/// [command.battery]
/// kind = "loop"
/// cmd = "dumpsys battery"
/// ```
///
/// All sections are optional; the command line overrides anything here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub watchdog: WatchdogSection,

    #[serde(default)]
    pub monkey: MonkeySection,

    /// Extra or overriding commands from `[command.<name>]`.
    #[serde(default)]
    pub command: BTreeMap<String, CommandSpec>,
}

/// `[run]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub devices: Vec<String>,

    #[serde(default)]
    pub commands: Vec<String>,

    /// Cycle interval in seconds.
    #[serde(default)]
    pub interval: Option<u64>,

    /// Total run time in minutes.
    #[serde(default)]
    pub minutes: Option<f64>,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub adb: Option<String>,

    #[serde(default)]
    pub process_names: Vec<String>,
}

/// `[watchdog]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    /// Deadline budget per task, in seconds.
    #[serde(default = "default_per_task_secs")]
    pub per_task_secs: u64,

    /// Lower bound of the per-cycle deadline, in seconds.
    #[serde(default = "default_floor_secs")]
    pub floor_secs: u64,
}

fn default_per_task_secs() -> u64 {
    10
}

fn default_floor_secs() -> u64 {
    10
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            per_task_secs: default_per_task_secs(),
            floor_secs: default_floor_secs(),
        }
    }
}

/// `[monkey]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonkeySection {
    /// Restrict the app monkey to these packages (an empty list still
    /// enables it).
    #[serde(default)]
    pub packages: Option<Vec<String>>,

    #[serde(default)]
    pub blacklist: Vec<String>,

    #[serde(default)]
    pub script: Option<PathBuf>,

    /// Milliseconds between events.
    #[serde(default)]
    pub throttle: Option<u64>,

    /// Event distribution, keyed `nav` or `pct-nav`.
    #[serde(default)]
    pub pct: BTreeMap<String, u32>,
}

/// One collection command: what to run and how it recurs.
///
/// Templates may use `{process}`, `{throttle}`, `{pct}`, `{packages}`,
/// `{blacklist}` and `{script}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandSpec {
    /// Base name of the log files; defaults to the command's table key.
    #[serde(default)]
    pub log_name: Option<String>,

    pub cmd: String,

    /// Remote cleanup command (kill a stale instance, delete a stale
    /// artifact).
    #[serde(default)]
    pub clean: Option<String>,

    /// Remote command run once before the first start (durable only).
    #[serde(default)]
    pub setup: Option<String>,

    #[serde(flatten)]
    pub strategy: StrategySpec,
}

impl CommandSpec {
    /// Deferred to the end of the run instead of executing every cycle.
    pub fn is_final(&self) -> bool {
        matches!(self.strategy, StrategySpec::OneShot { is_final: true })
    }
}

/// How a command is executed across cycles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    /// Run once. `final = true` defers it to the end of the run.
    OneShot {
        #[serde(default, rename = "final")]
        is_final: bool,
    },
    /// Run every cycle, appending a timestamped block.
    Loop,
    /// Run `cmd` as a cheap probe every cycle and `capture` only when the
    /// probe output changes.
    Diff { capture: String },
    /// Produce a remote artifact with `cmd` and pull it every `period_secs`.
    Artifact {
        remote: String,
        period_secs: u64,
        #[serde(default = "default_artifact_extension")]
        extension: String,
    },
    /// One long-running process, restarted only when it has stopped.
    Durable,
}

fn default_artifact_extension() -> String {
    "bin".to_string()
}

/// Monkey settings after merging CLI and file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonkeyOptions {
    pub packages: Option<Vec<String>>,
    pub blacklist: Vec<String>,
    pub script_lines: Option<Vec<String>>,
    pub throttle: u64,
    /// `(flag, percent)` pairs, e.g. `("pct-nav", 55)`.
    pub pct: Vec<(String, u32)>,
}

/// Fully resolved and validated settings for one collection run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub devices: Vec<DeviceId>,
    /// Selected command names, in execution order.
    pub commands: Vec<String>,
    pub log_root: PathBuf,
    pub interval: Duration,
    /// `None` runs until interrupted.
    pub total: Option<Duration>,
    pub adb: String,
    pub process_names: Vec<String>,
    pub monkey: MonkeyOptions,
    pub watchdog: WatchdogTiming,
    pub session: SessionOptions,
    pub table: CommandTable,
}

impl RunConfig {
    /// Template values for the selected commands.
    ///
    /// Only values that exist are set, so a command needing a missing one
    /// (`{process}` with no `-p`) is skipped at build time.
    pub fn task_params(&self) -> TaskParams {
        let mut params = TaskParams::new();

        if let Some(process) = self.process_names.first() {
            params.set("process", process.as_str());
        }

        let monkey = &self.monkey;
        params.set("throttle", monkey.throttle.to_string());

        // A zero share is left to monkey's own default rather than passed.
        let flag = |flag: &str, value: u32| (value != 0).then(|| format!("--{flag} {value}"));
        let pct: Vec<String> = if monkey.pct.is_empty() {
            MONKEY_PCT_DEFAULTS
                .iter()
                .filter_map(|&(f, v)| flag(f, v))
                .collect()
        } else {
            monkey.pct.iter().filter_map(|(f, v)| flag(f.as_str(), *v)).collect()
        };
        params.set("pct", pct.join(" "));

        if let Some(packages) = &monkey.packages {
            let flags: Vec<String> = packages.iter().map(|p| format!("-p {p}")).collect();
            params.set("packages", flags.join(" "));
        }

        if !monkey.blacklist.is_empty() {
            params.set("blacklist", monkey.blacklist.join(REMOTE_NEWLINE));
        }

        if let Some(lines) = &monkey.script_lines {
            let script: Vec<&str> = MONKEY_SCRIPT_HEADER
                .iter()
                .copied()
                .chain(lines.iter().map(String::as_str))
                .collect();
            params.set("script", script.join(REMOTE_NEWLINE));
        }

        params
    }
}
