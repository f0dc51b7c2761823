// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Every collection setting can also come from the optional TOML config
//! file; values given here win over the file.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `devprobe`.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "devprobe",
    version,
    about = "Periodically collect diagnostic output from adb-attached devices.",
    long_about = None
)]
pub struct CliArgs {
    /// Device IP address (network) or serial (local).
    #[arg(short = 'd', long = "device", value_name = "ADDR", num_args = 1..)]
    pub devices: Vec<String>,

    /// Collection commands (see `--dry-run` for the resolved list).
    #[arg(short = 'c', long = "command", value_name = "NAME", num_args = 1..)]
    pub commands: Vec<String>,

    /// Directory where the run directory is created.
    #[arg(short = 'l', long = "log-dir", value_name = "PATH")]
    pub log_dir: Option<PathBuf>,

    /// Total execution time in minutes; unbounded when omitted or <= 0.
    #[arg(short = 't', long = "time", value_name = "MINUTES")]
    pub minutes: Option<f64>,

    /// Cycle interval in seconds (default 10).
    #[arg(short = 'i', long = "interval", value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Target process names for per-process commands.
    #[arg(short = 'p', long = "process", value_name = "NAME", num_args = 1..)]
    pub process_names: Vec<String>,

    /// Run monkey, only visiting activities within these packages.
    #[arg(short = 'm', long = "monkey", value_name = "PKG", num_args = 0..)]
    pub monkey: Option<Vec<String>>,

    /// Run monkey, never visiting activities within these packages.
    #[arg(short = 'b', long = "blacklist", value_name = "PKG", num_args = 1..)]
    pub blacklist: Vec<String>,

    /// Run monkey repeatedly following this script file.
    #[arg(short = 's', long = "script", value_name = "PATH")]
    pub script: Option<PathBuf>,

    /// Fixed delay between monkey events in milliseconds (default 500).
    #[arg(short = 'o', long = "throttle", value_name = "MS")]
    pub throttle: Option<u64>,

    #[command(flatten)]
    pub pct: PctArgs,

    /// Optional TOML config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// adb program to invoke.
    #[arg(long, value_name = "PATH")]
    pub adb: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `-v`, `DEVPROBE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Verbose output (debug level).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Resolve devices and commands, print the plan, but don't connect.
    #[arg(long)]
    pub dry_run: bool,
}

/// Monkey event distribution overrides.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct PctArgs {
    /// Percentage of touch events.
    #[arg(long = "pct-touch", value_name = "PERCENT")]
    pub touch: Option<u32>,
    /// Percentage of motion events.
    #[arg(long = "pct-motion", value_name = "PERCENT")]
    pub motion: Option<u32>,
    /// Percentage of trackball events (default 5).
    #[arg(long = "pct-trackball", value_name = "PERCENT")]
    pub trackball: Option<u32>,
    /// Percentage of "basic" navigation events (default 55).
    #[arg(long = "pct-nav", value_name = "PERCENT")]
    pub nav: Option<u32>,
    /// Percentage of "major" navigation events (default 15).
    #[arg(long = "pct-majornav", value_name = "PERCENT")]
    pub majornav: Option<u32>,
    /// Percentage of "system" key events (default 15).
    #[arg(long = "pct-syskeys", value_name = "PERCENT")]
    pub syskeys: Option<u32>,
    /// Percentage of activity launches (default 9).
    #[arg(long = "pct-appswitch", value_name = "PERCENT")]
    pub appswitch: Option<u32>,
    /// Percentage of other types of events (default 1).
    #[arg(long = "pct-anyevent", value_name = "PERCENT")]
    pub anyevent: Option<u32>,
}

impl PctArgs {
    /// `(monkey flag name, value)` pairs for every override that was given.
    pub fn overrides(&self) -> Vec<(&'static str, u32)> {
        [
            ("pct-touch", self.touch),
            ("pct-motion", self.motion),
            ("pct-trackball", self.trackball),
            ("pct-nav", self.nav),
            ("pct-majornav", self.majornav),
            ("pct-syskeys", self.syskeys),
            ("pct-appswitch", self.appswitch),
            ("pct-anyevent", self.anyevent),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
