// src/lib.rs

pub mod cli;
pub mod config;
pub mod device;
pub mod engine;
pub mod errors;
pub mod layout;
pub mod logging;
pub mod task;

use std::future::Future;

use chrono::Local;
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::load_and_resolve;
use crate::config::model::RunConfig;
use crate::device::{Adb, Session};
use crate::engine::{Orchestrator, RunOptions, RunSummary};
use crate::errors::Result;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - device sessions
/// - the orchestrator
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let cfg = load_and_resolve(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(RunSummary::default());
    }

    collect(&cfg, shutdown_signal()).await
}

/// Connect every device and run the collection until the time budget is
/// spent or `shutdown` resolves.
///
/// Any device that cannot be connected aborts the run before collection
/// starts.
pub async fn collect<F>(cfg: &RunConfig, shutdown: F) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let run_dir = layout::create_run_dir(&cfg.log_root, Local::now())?;
    info!(dir = ?run_dir, devices = cfg.devices.len(), "run directory ready");

    let adb = Adb::new(cfg.adb.clone());
    let mut sessions = Vec::with_capacity(cfg.devices.len());
    for id in &cfg.devices {
        let session = Session::open(id.clone(), &run_dir, adb.clone(), cfg.session.clone()).await?;
        info!(device = %session.id(), address = %session.address(), "device connected");
        sessions.push(session);
    }

    let options = RunOptions {
        interval: cfg.interval,
        total: cfg.total,
        watchdog: cfg.watchdog,
    };
    let mut orchestrator = Orchestrator::build(
        &sessions,
        &cfg.table,
        &cfg.commands,
        &cfg.task_params(),
        options,
    )?;

    orchestrator.run(shutdown).await
}

/// Resolves on Ctrl-C. If the listener cannot be installed it never
/// resolves, so the run still ends on its time budget.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Print the resolved plan without touching any device.
fn print_dry_run(cfg: &RunConfig) {
    println!("devprobe dry-run");
    println!("  adb = {}", cfg.adb);
    println!("  log_root = {}", cfg.log_root.display());
    println!("  interval = {}s", cfg.interval.as_secs());
    match cfg.total {
        Some(total) => println!("  total = {:.1} min", total.as_secs_f64() / 60.0),
        None => println!("  total = until interrupted"),
    }
    println!(
        "  watchdog = {}s per task, {}s floor",
        cfg.watchdog.per_task.as_secs(),
        cfg.watchdog.floor.as_secs()
    );
    println!();

    println!("devices ({}):", cfg.devices.len());
    for device in &cfg.devices {
        let kind = if device.is_network() { "network" } else { "serial" };
        println!("  - {device} ({kind})");
    }
    println!();

    let params = cfg.task_params();
    println!("commands ({}):", cfg.commands.len());
    for name in &cfg.commands {
        let Some(spec) = cfg.table.get(name) else {
            continue;
        };
        println!("  - {name}");
        println!("      kind: {:?}", spec.strategy);
        match task::render(&spec.cmd, &params) {
            Ok(cmd) => println!("      cmd: {cmd}"),
            Err(e) => println!("      skipped: {e}"),
        }
        if let Some(clean) = &spec.clean {
            println!("      clean: {clean}");
        }
    }

    debug!("dry-run complete (no execution)");
}
