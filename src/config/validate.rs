// src/config/validate.rs

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::cli::CliArgs;
use crate::config::model::{CommandSpec, MonkeyOptions, RawConfigFile, RunConfig, StrategySpec};
use crate::device::{DeviceId, SessionOptions};
use crate::engine::WatchdogTiming;
use crate::errors::{DevprobeError, Result};
use crate::task::catalog::MONKEY_PCT_DEFAULTS;
use crate::task::{CommandTable, DEFAULT_COMMANDS};

const DEFAULT_INTERVAL_SECS: u64 = 10;
const DEFAULT_THROTTLE_MS: u64 = 500;
const DEFAULT_ADB: &str = "adb";

/// Merge `cli` over `raw`, fill in defaults and validate the result.
pub fn resolve(cli: &CliArgs, raw: RawConfigFile) -> Result<RunConfig> {
    let RawConfigFile {
        run,
        watchdog,
        monkey,
        command,
    } = raw;

    let devices: Vec<DeviceId> = pick_list(&cli.devices, run.devices)
        .into_iter()
        .map(DeviceId::new)
        .collect();
    if devices.is_empty() {
        return Err(DevprobeError::Configuration(
            "no devices given; use -d/--device or [run].devices".to_string(),
        ));
    }

    let interval_secs = cli
        .interval
        .or(run.interval)
        .unwrap_or(DEFAULT_INTERVAL_SECS);
    if interval_secs == 0 {
        return Err(DevprobeError::Configuration(
            "interval must be >= 1 second (got 0)".to_string(),
        ));
    }

    let total = cli
        .minutes
        .or(run.minutes)
        .filter(|m| m.is_finite() && *m > 0.0)
        .map(|m| Duration::from_secs_f64(m * 60.0));

    if watchdog.floor_secs == 0 {
        return Err(DevprobeError::Configuration(
            "[watchdog].floor_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    for (name, spec) in &command {
        validate_command(name, spec)?;
    }
    let mut table = CommandTable::builtin();
    table.extend(command);

    let packages = cli.monkey.clone().or(monkey.packages);
    let mut process_names = pick_list(&cli.process_names, run.process_names);
    if process_names.is_empty() {
        if let Some(packages) = &packages {
            process_names = packages.clone();
        }
    }
    let blacklist = pick_list(&cli.blacklist, monkey.blacklist);
    let script_lines = match cli.script.clone().or(monkey.script) {
        Some(path) => Some(read_script(path)?),
        None => None,
    };

    let mut pct = Vec::new();
    for (key, value) in monkey.pct {
        set_pct(&mut pct, &key, value)?;
    }
    for (key, value) in cli.pct.overrides() {
        set_pct(&mut pct, key, value)?;
    }

    let mut selected = Vec::new();
    if script_lines.is_some() {
        selected.push("script".to_string());
    }
    if !blacklist.is_empty() {
        selected.push("blacklist".to_string());
    }
    if packages.is_some() {
        selected.push("monkey".to_string());
    }
    let requested = pick_list(&cli.commands, run.commands);
    if requested.is_empty() {
        selected.extend(DEFAULT_COMMANDS.iter().map(|c| c.to_string()));
    } else {
        selected.extend(requested);
    }
    let mut commands: Vec<String> = Vec::with_capacity(selected.len());
    for name in selected {
        if !commands.contains(&name) {
            commands.push(name);
        }
    }

    let unknown: Vec<&str> = commands
        .iter()
        .map(String::as_str)
        .filter(|name| !table.contains(name))
        .collect();
    if !unknown.is_empty() {
        return Err(DevprobeError::Configuration(format!(
            "unknown command(s) {}; known commands: {}",
            unknown.join(", "),
            table.names().collect::<Vec<_>>().join(", ")
        )));
    }

    let config = RunConfig {
        devices,
        commands,
        log_root: cli
            .log_dir
            .clone()
            .or(run.log_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        interval: Duration::from_secs(interval_secs),
        total,
        adb: cli
            .adb
            .clone()
            .or(run.adb)
            .unwrap_or_else(|| DEFAULT_ADB.to_string()),
        process_names,
        monkey: MonkeyOptions {
            packages,
            blacklist,
            script_lines,
            throttle: cli
                .throttle
                .or(monkey.throttle)
                .unwrap_or(DEFAULT_THROTTLE_MS),
            pct,
        },
        watchdog: WatchdogTiming {
            per_task: Duration::from_secs(watchdog.per_task_secs),
            floor: Duration::from_secs(watchdog.floor_secs),
        },
        session: SessionOptions::default(),
        table,
    };

    debug!(
        devices = config.devices.len(),
        commands = ?config.commands,
        "configuration resolved"
    );
    Ok(config)
}

/// CLI values win when any were given.
fn pick_list(cli: &[String], file: Vec<String>) -> Vec<String> {
    if cli.is_empty() { file } else { cli.to_vec() }
}

fn validate_command(name: &str, spec: &CommandSpec) -> Result<()> {
    if spec.cmd.trim().is_empty() {
        return Err(DevprobeError::Configuration(format!(
            "command '{name}' has an empty `cmd`"
        )));
    }

    match &spec.strategy {
        StrategySpec::Diff { capture } if capture.trim().is_empty() => {
            Err(DevprobeError::Configuration(format!(
                "diff command '{name}' has an empty `capture`"
            )))
        }
        StrategySpec::Artifact {
            remote,
            period_secs,
            ..
        } => {
            if remote.trim().is_empty() {
                return Err(DevprobeError::Configuration(format!(
                    "artifact command '{name}' has an empty `remote`"
                )));
            }
            if *period_secs == 0 {
                return Err(DevprobeError::Configuration(format!(
                    "artifact command '{name}' must have period_secs >= 1 (got 0)"
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn read_script(path: PathBuf) -> Result<Vec<String>> {
    let contents = fs::read_to_string(&path).map_err(|e| {
        DevprobeError::Configuration(format!("cannot read monkey script {path:?}: {e}"))
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Record `--pct-<kind> value`; `key` may omit the `pct-` prefix. A later
/// value for the same kind replaces the earlier one.
fn set_pct(pct: &mut Vec<(String, u32)>, key: &str, value: u32) -> Result<()> {
    let flag = if key.starts_with("pct-") {
        key.to_string()
    } else {
        format!("pct-{key}")
    };

    if !MONKEY_PCT_DEFAULTS.iter().any(|(known, _)| *known == flag) {
        return Err(DevprobeError::Configuration(format!(
            "unknown monkey event kind '{key}'"
        )));
    }
    if value > 100 {
        return Err(DevprobeError::Configuration(format!(
            "--{flag} must be a percentage (got {value})"
        )));
    }

    match pct.iter_mut().find(|(existing, _)| *existing == flag) {
        Some(entry) => entry.1 = value,
        None => pct.push((flag, value)),
    }
    Ok(())
}
