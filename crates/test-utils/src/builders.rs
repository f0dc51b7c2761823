#![allow(dead_code)]

use std::time::Duration;

use devprobe::config::{CommandSpec, StrategySpec};
use devprobe::device::{DeviceId, Session, SessionOptions};
use devprobe::engine::{RunOptions, WatchdogTiming};

use crate::FakeAdb;

/// Builder for `CommandSpec`.
pub struct CommandSpecBuilder {
    spec: CommandSpec,
}

impl CommandSpecBuilder {
    fn new(cmd: &str, strategy: StrategySpec) -> Self {
        Self {
            spec: CommandSpec {
                log_name: None,
                cmd: cmd.to_string(),
                clean: None,
                setup: None,
                strategy,
            },
        }
    }

    pub fn looped(cmd: &str) -> Self {
        Self::new(cmd, StrategySpec::Loop)
    }

    pub fn one_shot(cmd: &str, is_final: bool) -> Self {
        Self::new(cmd, StrategySpec::OneShot { is_final })
    }

    pub fn diff(probe: &str, capture: &str) -> Self {
        Self::new(
            probe,
            StrategySpec::Diff {
                capture: capture.to_string(),
            },
        )
    }

    pub fn artifact(trigger: &str, remote: &str, period_secs: u64) -> Self {
        Self::new(
            trigger,
            StrategySpec::Artifact {
                remote: remote.to_string(),
                period_secs,
                extension: "bin".to_string(),
            },
        )
    }

    pub fn durable(cmd: &str) -> Self {
        Self::new(cmd, StrategySpec::Durable)
    }

    pub fn log_name(mut self, name: &str) -> Self {
        self.spec.log_name = Some(name.to_string());
        self
    }

    pub fn clean(mut self, cmd: &str) -> Self {
        self.spec.clean = Some(cmd.to_string());
        self
    }

    pub fn setup(mut self, cmd: &str) -> Self {
        self.spec.setup = Some(cmd.to_string());
        self
    }

    pub fn build(self) -> CommandSpec {
        self.spec
    }
}

/// Session for serial identity `id` writing into `log_dir`, driven by
/// `adb`. Serial identities need no connect round-trip.
pub fn serial_session(adb: &FakeAdb, id: &str, log_dir: &std::path::Path) -> Session {
    std::fs::create_dir_all(log_dir).expect("create device log dir");
    Session::new(
        DeviceId::new(id),
        log_dir.to_path_buf(),
        adb.adb(),
        fast_session_options(),
    )
}

pub fn fast_session_options() -> SessionOptions {
    SessionOptions {
        auth_backoff: Duration::from_millis(50),
    }
}

/// Loop settings with a generous watchdog.
pub fn run_options(interval: Duration, total: Option<Duration>) -> RunOptions {
    RunOptions {
        interval,
        total,
        watchdog: WatchdogTiming {
            per_task: Duration::from_secs(5),
            floor: Duration::from_secs(5),
        },
    }
}
