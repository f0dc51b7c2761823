// tests/orchestrator.rs

use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use devprobe::device::Session;
use devprobe::engine::{Orchestrator, RunOptions, Watchdog, WatchdogTiming};
use devprobe::errors::DevprobeError;
use devprobe::task::{CommandTable, CommandTask, PollingLoop, StatefulDiff, TaskParams};
use devprobe_test_utils::builders::{run_options, serial_session, CommandSpecBuilder};
use devprobe_test_utils::{init_tracing, with_timeout, FakeAdb};

fn block_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| l.starts_with(">>") && l.ends_with(">>"))
        .count()
}

fn names(selected: &[&str]) -> Vec<String> {
    selected.iter().map(|s| s.to_string()).collect()
}

fn two_devices(adb: &FakeAdb, root: &Path) -> Vec<Session> {
    vec![
        serial_session(adb, "serial-a", &root.join("serial-a")),
        serial_session(adb, "serial-b", &root.join("serial-b")),
    ]
}

fn tight_watchdog(interval_ms: u64, total_ms: u64, floor_ms: u64) -> RunOptions {
    RunOptions {
        interval: Duration::from_millis(interval_ms),
        total: Some(Duration::from_millis(total_ms)),
        watchdog: WatchdogTiming {
            per_task: Duration::ZERO,
            floor: Duration::from_millis(floor_ms),
        },
    }
}

#[tokio::test]
async fn two_devices_three_loops_three_cycles() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let sessions = two_devices(&adb, root.path());

    let table = CommandTable::new()
        .with("top", CommandSpecBuilder::looped("echo top").build())
        .with("meminfo", CommandSpecBuilder::looped("echo meminfo").build())
        .with("cpuinfo", CommandSpecBuilder::looped("echo cpuinfo").build());

    let mut orchestrator = Orchestrator::build(
        &sessions,
        &table,
        &names(&["top", "meminfo", "cpuinfo"]),
        &TaskParams::new(),
        run_options(Duration::from_millis(100), Some(Duration::from_millis(300))),
    )?;
    assert_eq!(orchestrator.tasks().len(), 6);

    // device-major order
    let order: Vec<(String, String)> = orchestrator
        .tasks()
        .iter()
        .map(|t| (t.session().id().to_string(), t.name().to_string()))
        .collect();
    assert_eq!(order[0], ("serial-a".to_string(), "top".to_string()));
    assert_eq!(order[2], ("serial-a".to_string(), "cpuinfo".to_string()));
    assert_eq!(order[3], ("serial-b".to_string(), "top".to_string()));

    let summary = with_timeout(orchestrator.run(std::future::pending())).await?;

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.watchdog_fires, 0);
    assert!(!summary.interrupted);

    let mut files = 0;
    for device in ["serial-a", "serial-b"] {
        for name in ["top", "meminfo", "cpuinfo"] {
            let log = root.path().join(device).join(format!("{name}.txt"));
            assert_eq!(block_count(&log), 3, "{log:?}");
            files += 1;
        }
    }
    assert_eq!(files, 6);
    Ok(())
}

#[tokio::test]
async fn unknown_command_is_a_configuration_error() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let sessions = two_devices(&adb, root.path());

    let result = Orchestrator::build(
        &sessions,
        &CommandTable::builtin(),
        &names(&["top", "no-such-command"]),
        &TaskParams::new(),
        run_options(Duration::from_secs(1), None),
    );

    match result {
        Err(DevprobeError::Configuration(msg)) => assert!(msg.contains("no-such-command")),
        other => panic!("expected Configuration error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn commands_missing_parameters_are_skipped() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let sessions = two_devices(&adb, root.path());

    let orchestrator = Orchestrator::build(
        &sessions,
        &CommandTable::builtin(),
        &names(&["top", "memdetail", "dumpheap", "bugreport"]),
        &TaskParams::new(),
        run_options(Duration::from_secs(1), None),
    )?;

    let kept: Vec<&str> = orchestrator.tasks().iter().map(|t| t.name()).collect();
    assert_eq!(kept, vec!["top", "top"]);
    assert_eq!(orchestrator.finals().len(), 2);
    Ok(())
}

#[tokio::test]
async fn final_commands_run_once_after_the_loop() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let sessions = vec![serial_session(&adb, "serial-a", root.path())];

    let table = CommandTable::new()
        .with("top", CommandSpecBuilder::looped("echo top").build())
        .with(
            "bugreport",
            CommandSpecBuilder::one_shot("echo report", true).build(),
        );

    let mut orchestrator = Orchestrator::build(
        &sessions,
        &table,
        &names(&["bugreport", "top"]),
        &TaskParams::new(),
        run_options(Duration::from_millis(50), Some(Duration::from_millis(100))),
    )?;
    let summary = with_timeout(orchestrator.run(std::future::pending())).await?;

    assert_eq!(summary.cycles, 2);
    assert_eq!(block_count(&root.path().join("top.txt")), 2);
    assert_eq!(fs::read_to_string(root.path().join("bugreport.txt"))?, "report\n");
    Ok(())
}

#[tokio::test]
async fn watchdog_kills_every_task() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let session = serial_session(&adb, "serial-a", root.path());

    let mut durable = devprobe::task::Durable::new("logcat", "sleep 30", None, None, session.clone());
    durable.execute().await?;
    let mut hung = PollingLoop::new("hung", "sleep 30", session);
    assert_eq!(durable.slot().running(), 1);

    let watchdog = Watchdog::arm(
        Duration::from_millis(200),
        vec![durable.slot().clone(), hung.slot().clone()],
    );

    let started = Instant::now();
    with_timeout(hung.execute()).await?;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(watchdog.has_fired());
    assert!(with_timeout(watchdog.disarm()).await);
    assert!(hung.is_idle());
    assert!(durable.is_idle());
    Ok(())
}

#[tokio::test]
async fn disarmed_watchdog_never_fires() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let session = serial_session(&adb, "serial-a", root.path());
    let mut durable = devprobe::task::Durable::new("logcat", "sleep 30", None, None, session);
    durable.execute().await?;

    let watchdog = Watchdog::arm(Duration::from_millis(100), vec![durable.slot().clone()]);
    assert!(!with_timeout(watchdog.disarm()).await);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(durable.slot().running(), 1);

    durable.clean().await?;
    Ok(())
}

#[tokio::test]
async fn no_process_survives_into_the_next_cycle() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let session = serial_session(&adb, "serial-a", root.path());

    let tasks: Vec<Box<dyn CommandTask>> = vec![
        Box::new(PollingLoop::new("hung", "sleep 30", session.clone())),
        Box::new(PollingLoop::new("after", "echo after", session)),
    ];
    let mut orchestrator = Orchestrator::from_tasks(tasks, Vec::new(), tight_watchdog(50, 100, 300));

    let started = Instant::now();
    let summary = with_timeout(orchestrator.run(std::future::pending())).await?;

    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.watchdog_fires, 2);
    assert!(started.elapsed() < Duration::from_secs(5));
    for task in orchestrator.tasks() {
        assert!(task.is_idle(), "{} still running", task.name());
    }
    // the task after the hung one still samples on a fresh deadline
    assert_eq!(block_count(&root.path().join("hung.txt")), 2);
    assert_eq!(block_count(&root.path().join("after.txt")), 2);
    Ok(())
}

#[tokio::test]
async fn hung_device_does_not_starve_the_next_one() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let sessions = two_devices(&adb, root.path());

    let tasks: Vec<Box<dyn CommandTask>> = vec![
        Box::new(PollingLoop::new("top", "sleep 30", sessions[0].clone())),
        Box::new(PollingLoop::new("top", "echo b", sessions[1].clone())),
    ];
    let mut orchestrator = Orchestrator::from_tasks(tasks, Vec::new(), tight_watchdog(50, 150, 200));

    let summary = with_timeout(orchestrator.run(std::future::pending())).await?;

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.watchdog_fires, 3);
    assert_eq!(block_count(&root.path().join("serial-b").join("top.txt")), 3);
    for task in orchestrator.tasks() {
        assert!(task.is_idle(), "{} still running", task.name());
    }
    Ok(())
}

#[tokio::test]
async fn hung_diff_check_does_not_start_an_unbounded_capture() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let marker = root.path().join("seen");
    let logs = root.path().join("logs");
    let session = serial_session(&adb, "serial-a", &logs);

    // prints "A" once, then hangs on every later call
    let check = format!(
        "if [ -e {m} ]; then exec sleep 30; else touch {m}; echo A; fi",
        m = marker.display()
    );
    let tasks: Vec<Box<dyn CommandTask>> =
        vec![Box::new(StatefulDiff::new("anr", check, "sleep 30", session))];
    let mut orchestrator = Orchestrator::from_tasks(tasks, Vec::new(), tight_watchdog(50, 100, 200));

    let started = Instant::now();
    let summary = with_timeout(orchestrator.run(std::future::pending())).await?;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.watchdog_fires, 1);
    assert!(orchestrator.tasks()[0].is_idle());
    let captures = fs::read_dir(&logs)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("anr_"))
        .count();
    assert_eq!(captures, 0);
    Ok(())
}

#[tokio::test]
async fn interrupt_stops_the_loop_and_runs_teardown() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let root = tempfile::tempdir()?;
    let sessions = vec![serial_session(&adb, "serial-a", root.path())];

    let table = CommandTable::new()
        .with("top", CommandSpecBuilder::looped("echo top").build())
        .with("logcat", CommandSpecBuilder::durable("sleep 30").build())
        .with(
            "usagestats",
            CommandSpecBuilder::one_shot("echo usage", true).build(),
        );

    let mut orchestrator = Orchestrator::build(
        &sessions,
        &table,
        &names(&["logcat", "top", "usagestats"]),
        &TaskParams::new(),
        run_options(Duration::from_millis(100), None),
    )?;

    let summary = with_timeout(
        orchestrator.run(tokio::time::sleep(Duration::from_millis(350))),
    )
    .await?;

    assert!(summary.interrupted);
    assert!(summary.cycles >= 1);
    for task in orchestrator.tasks() {
        assert!(task.is_idle(), "{} still running", task.name());
    }
    assert_eq!(fs::read_to_string(root.path().join("usagestats.txt"))?, "usage\n");
    Ok(())
}
