// tests/task_strategies.rs

use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use devprobe::errors::DevprobeError;
use devprobe::task::{
    ArtifactPull, ChangeDetector, CommandTask, Durable, OneShot, PollingLoop, ProcessSlot,
    PullPhase, PullSchedule, StatefulDiff,
};
use devprobe_test_utils::builders::serial_session;
use devprobe_test_utils::{init_tracing, wait_until, with_timeout, FakeAdb};
use proptest::prelude::*;

/// Files in `dir` named `<prefix>_<timestamp>...`.
fn stamped(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read log dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(&format!("{prefix}_")))
        .collect();
    names.sort();
    names
}

fn block_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| l.starts_with(">>") && l.ends_with(">>"))
        .count()
}

#[test]
fn change_detector_reports_transitions_only() {
    let mut detector = ChangeDetector::new();
    let fired: Vec<bool> = ["A", "A", "B", "B", "A"]
        .iter()
        .map(|s| detector.observe(s))
        .collect();
    assert_eq!(fired, vec![false, false, true, false, true]);
    assert_eq!(detector.baseline(), Some("A"));
}

#[test]
fn change_detector_treats_empty_output_as_a_value() {
    let mut detector = ChangeDetector::new();
    assert!(!detector.observe(""));
    assert!(!detector.observe(""));
    assert!(detector.observe("trace"));
    assert!(detector.observe(""));
}

#[test]
fn pull_schedule_with_delay_six() {
    let mut schedule = PullSchedule::with_delay(6);
    let phases: Vec<PullPhase> = (0..19).map(|_| schedule.tick()).collect();

    let at = |phase: PullPhase| -> Vec<usize> {
        phases
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == phase)
            .map(|(i, _)| i)
            .collect()
    };
    assert_eq!(at(PullPhase::Trigger), vec![4, 10, 16]);
    assert_eq!(at(PullPhase::Pull), vec![6, 12, 18]);
}

#[test]
fn pull_delay_is_period_over_interval_with_a_floor() {
    let hourly = PullSchedule::new(Duration::from_secs(3600), Duration::from_secs(10));
    assert_eq!(hourly.delay(), 360);

    let too_short = PullSchedule::new(Duration::from_secs(1), Duration::from_secs(10));
    assert_eq!(too_short.delay(), 3);
}

proptest! {
    #[test]
    fn pull_schedule_repeats_every_delay(delay in 3u64..40, cycles in 1usize..200) {
        let mut schedule = PullSchedule::with_delay(delay);
        let d = delay as usize;
        for i in 0..cycles {
            let expected = if i > 0 && i % d == 0 {
                PullPhase::Pull
            } else if i + 2 >= d && (i + 2) % d == 0 {
                PullPhase::Trigger
            } else {
                PullPhase::Idle
            };
            prop_assert_eq!(schedule.tick(), expected, "cycle {}", i);
        }
    }

    #[test]
    fn change_detector_counts_adjacent_differences(samples in proptest::collection::vec("[ab]{0,2}", 1..30)) {
        let mut detector = ChangeDetector::new();
        let fired = samples.iter().filter(|s| detector.observe(s)).count();
        let expected = samples.windows(2).filter(|w| w[0] != w[1]).count();
        prop_assert_eq!(fired, expected);
    }
}

#[tokio::test]
async fn polling_loop_appends_one_block_per_cycle() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let session = serial_session(&adb, "emulator-5554", dir.path());
    let mut task = PollingLoop::new("meminfo", "echo sample", session);

    with_timeout(task.execute()).await?;
    with_timeout(task.execute()).await?;

    let log = dir.path().join("meminfo.txt");
    assert_eq!(block_count(&log), 2);
    assert_eq!(fs::read_to_string(&log)?.matches("sample").count(), 2);
    assert!(task.is_idle());
    Ok(())
}

#[tokio::test]
async fn one_shot_runs_once_per_instance() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let session = serial_session(&adb, "emulator-5554", dir.path());
    let mut task = OneShot::new("bugreport", "echo report", session);

    with_timeout(task.execute()).await?;
    with_timeout(task.execute()).await?;

    assert!(task.is_done());
    assert_eq!(fs::read_to_string(dir.path().join("bugreport.txt"))?, "report\n");
    assert_eq!(adb.count("shell"), 1);
    Ok(())
}

#[tokio::test]
async fn stateful_diff_captures_on_change_only() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let state = dir.path().join("probe_state");
    let logs = dir.path().join("logs");
    let session = serial_session(&adb, "emulator-5554", &logs);

    let mut task = StatefulDiff::new(
        "anr",
        format!("cat {}", state.display()),
        "echo captured",
        session,
    );

    for sample in ["A", "A", "B", "B", "A"] {
        fs::write(&state, sample)?;
        with_timeout(task.execute()).await?;
    }

    let captures = stamped(&logs, "anr");
    assert_eq!(captures.len(), 2, "captures: {captures:?}");
    for name in &captures {
        assert_eq!(fs::read_to_string(logs.join(name))?, "captured");
    }
    Ok(())
}

#[tokio::test]
async fn killed_diff_check_leaves_the_baseline_alone() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let state = dir.path().join("probe_state");
    let logs = dir.path().join("logs");
    let session = serial_session(&adb, "emulator-5554", &logs);

    let mut task = StatefulDiff::new(
        "anr",
        format!("cat {}", state.display()),
        "sleep 30",
        session,
    );

    fs::write(&state, "A")?;
    with_timeout(task.execute()).await?;

    task.slot().fence().await;
    match with_timeout(task.execute()).await {
        Err(DevprobeError::Killed(command)) => assert!(command.starts_with("cat ")),
        other => panic!("expected Killed, got {other:?}"),
    }
    task.slot().unfence();

    // still "A" afterwards, so nothing to capture
    with_timeout(task.execute()).await?;
    assert!(stamped(&logs, "anr").is_empty());
    assert!(task.is_idle());
    Ok(())
}

#[tokio::test]
async fn fenced_slot_kills_new_processes_until_unfenced() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let session = serial_session(&adb, "emulator-5554", dir.path());
    let slot = ProcessSlot::new();

    slot.fence().await;
    assert!(slot.is_fenced());
    let handle = session.shell("sleep 30", None)?;
    slot.track(&handle);
    let exit = with_timeout(session.capture_exit(handle)).await;
    assert!(exit.killed);
    assert!(slot.is_idle());

    slot.unfence();
    let handle = session.shell("echo alive", None)?;
    slot.track(&handle);
    let exit = with_timeout(session.capture_exit(handle)).await;
    assert!(!exit.killed);
    assert_eq!(exit.output, "alive");
    Ok(())
}

#[tokio::test]
async fn artifact_is_triggered_then_pulled() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let remote = dir.path().join("dump.hprof");
    let logs = dir.path().join("logs");
    let session = serial_session(&adb, "emulator-5554", &logs);

    let mut task = ArtifactPull::new(
        "dumpheap",
        format!("echo heap > {}", remote.display()),
        Some(format!("rm -f {}", remote.display())),
        remote.to_string_lossy(),
        "hprof",
        PullSchedule::with_delay(3),
        session,
    );

    // cycle 0: idle, cycle 1: trigger, cycle 2: idle
    for _ in 0..3 {
        with_timeout(task.execute()).await?;
    }
    assert!(remote.exists());
    assert!(stamped(&logs, "dumpheap").is_empty());

    // cycle 3: pull
    with_timeout(task.execute()).await?;
    let pulled = stamped(&logs, "dumpheap");
    assert_eq!(pulled.len(), 1);
    assert!(pulled[0].ends_with(".hprof"));
    assert_eq!(fs::read_to_string(logs.join(&pulled[0]))?.trim(), "heap");

    // clean removes the remote artifact
    with_timeout(task.clean()).await?;
    assert!(!remote.exists());
    Ok(())
}

#[tokio::test]
async fn failed_pull_is_a_command_failure() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let remote = dir.path().join("never-written.hprof");
    let session = serial_session(&adb, "emulator-5554", &dir.path().join("logs"));

    let mut task = ArtifactPull::new(
        "dumpheap",
        "true",
        None,
        remote.to_string_lossy(),
        "hprof",
        PullSchedule::with_delay(3),
        session,
    );

    for _ in 0..3 {
        with_timeout(task.execute()).await?;
    }
    match with_timeout(task.execute()).await {
        Err(DevprobeError::CommandFailure { command, code }) => {
            assert!(command.starts_with("pull"));
            assert_ne!(code, 0);
        }
        other => panic!("expected CommandFailure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn durable_does_not_double_spawn() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let session = serial_session(&adb, "emulator-5554", dir.path());
    let mut task = Durable::new("logcat", "echo streaming; sleep 30", None, None, session);

    with_timeout(task.execute()).await?;
    with_timeout(task.execute()).await?;

    assert_eq!(task.starts(), 1);
    assert_eq!(task.slot().running(), 1);
    assert_eq!(stamped(dir.path(), "logcat").len(), 1);

    with_timeout(task.clean()).await?;
    assert!(task.is_idle());
    Ok(())
}

#[tokio::test]
async fn durable_restarts_once_after_kill() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let marks = dir.path().join("marks.log");
    let logs = dir.path().join("logs");
    let session = serial_session(&adb, "emulator-5554", &logs);
    let mut task = Durable::new(
        "monkey",
        "sleep 30",
        Some(format!("echo clean >> {}", marks.display())),
        Some(format!("echo setup >> {}", marks.display())),
        session,
    );

    with_timeout(task.execute()).await?;
    with_timeout(task.kill()).await;
    assert!(task.is_idle());

    with_timeout(task.execute()).await?;
    with_timeout(task.execute()).await?;

    assert_eq!(task.starts(), 2);
    assert_eq!(task.slot().running(), 1);
    assert_eq!(stamped(&logs, "monkey").len(), 2);

    // setup only before the first start, clean before every start
    let lines: Vec<String> = fs::read_to_string(&marks)?
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec!["setup", "clean", "clean"]);

    with_timeout(task.clean()).await?;
    assert!(task.is_idle());
    Ok(())
}

#[tokio::test]
async fn durable_restarts_after_process_exits() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let adb = FakeAdb::new();
    let dir = tempfile::tempdir()?;
    let session = serial_session(&adb, "emulator-5554", dir.path());
    let mut task = Durable::new("event", "echo short-lived", None, None, session);

    with_timeout(task.execute()).await?;
    assert!(wait_until(Duration::from_secs(5), || task.is_idle()).await);

    with_timeout(task.execute()).await?;
    assert_eq!(task.starts(), 2);

    assert!(wait_until(Duration::from_secs(5), || task.is_idle()).await);
    let files = stamped(dir.path(), "event");
    assert_eq!(files.len(), 2);
    for name in &files {
        assert_eq!(fs::read_to_string(dir.path().join(name))?.trim(), "short-lived");
    }
    Ok(())
}
