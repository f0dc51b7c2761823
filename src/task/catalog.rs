// src/task/catalog.rs

//! The table of known collection commands and how to bind one to a device.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{CommandSpec, StrategySpec};
use crate::device::Session;
use crate::errors::Result;
use crate::task::{
    render, ArtifactPull, CommandTask, Durable, OneShot, PollingLoop, PullSchedule,
    StatefulDiff, TaskParams,
};

/// Commands collected when none are selected.
pub const DEFAULT_COMMANDS: &[&str] = &["anr", "bugreport", "cpuinfo", "logcat", "meminfo", "top"];

const MONKEY_CMD: &str = "monkey -v -v -v --ignore-crashes --ignore-timeouts \
    --ignore-security-exceptions --kill-process-after-error --monitor-native-crashes";
const MONKEY_COUNT: u64 = 1_200_000_000;
const MONKEY_KILL: &str = "busybox killall com.android.commands.monkey";
const MONKEY_BLACKLIST_FILE: &str = "/mnt/sdcard/devprobe_monkey_blacklist.txt";
const MONKEY_SCRIPT_FILE: &str = "/mnt/sdcard/devprobe_monkey_script.txt";

/// Lines the monkey script format expects before the user's events.
pub const MONKEY_SCRIPT_HEADER: &[&str] =
    &["type = devprobe_user", "count = 1", "speed = 1.0", "start data >>"];

/// Event distribution used when no `--pct-*` override is given.
pub const MONKEY_PCT_DEFAULTS: &[(&str, u32)] = &[
    ("pct-touch", 0),
    ("pct-motion", 0),
    ("pct-trackball", 5),
    ("pct-nav", 55),
    ("pct-majornav", 15),
    ("pct-syskeys", 15),
    ("pct-appswitch", 9),
    ("pct-anyevent", 1),
];

const HEAP_DUMP: &str = "/sdcard/dumpheap.hprof";

/// Name → command template table handed to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandTable {
    specs: BTreeMap<String, CommandSpec>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock Android diagnostics.
    pub fn builtin() -> Self {
        let mut table = Self::new();

        for (key, log_name, cmd) in [
            ("top", "top", "top -n 1"),
            ("meminfo", "meminfo", "dumpsys meminfo"),
            ("cpuinfo", "cpuinfo", "dumpsys cpuinfo"),
            ("mali", "mali", "librank -P /dev/mali"),
            ("activity", "activity", "dumpsys activity"),
            ("oom", "activity_oom", "dumpsys activity oom"),
            ("processes", "activity_processes", "dumpsys activity processes"),
            ("procstats", "activity_procstats", "dumpsys activity procstats"),
            ("temp0", "temperature_zone0", "cat /sys/class/thermal/thermal_zone0/temp"),
            ("temp1", "temperature_zone1", "cat /sys/class/thermal/thermal_zone1/temp"),
            ("memdetail", "memdetail", "dumpsys meminfo -a {process}"),
            ("showmap", "showmap", "ps | grep {process} | awk '{print $2}' | xargs showmap"),
        ] {
            table.insert(key, spec(log_name, cmd, StrategySpec::Loop));
        }

        table.insert(
            "anr",
            spec(
                "anr",
                "ls -l /data/anr/traces.txt",
                StrategySpec::Diff {
                    capture: "cat /data/anr/traces.txt".to_string(),
                },
            ),
        );

        table.insert(
            "dumpheap",
            CommandSpec {
                clean: Some(format!("rm -f {HEAP_DUMP}")),
                ..spec(
                    "dumpheap",
                    &format!("am dumpheap {{process}} {HEAP_DUMP}"),
                    StrategySpec::Artifact {
                        remote: HEAP_DUMP.to_string(),
                        period_secs: 3600,
                        extension: "hprof".to_string(),
                    },
                )
            },
        );

        table.insert(
            "logcat",
            CommandSpec {
                clean: Some("busybox killall logcat".to_string()),
                ..spec("logcat", "logcat -v threadtime", StrategySpec::Durable)
            },
        );
        table.insert(
            "event",
            spec("logcat_event", "logcat -v threadtime -b events", StrategySpec::Durable),
        );

        table.insert(
            "monkey",
            monkey(format!(
                "{MONKEY_CMD} {{pct}} {{packages}} --throttle {{throttle}} {MONKEY_COUNT}"
            ))
        );
        table.insert(
            "blacklist",
            CommandSpec {
                setup: Some(format!("echo '{{blacklist}}' > {MONKEY_BLACKLIST_FILE}")),
                ..monkey(format!(
                    "{MONKEY_CMD} {{pct}} --pkg-blacklist-file {MONKEY_BLACKLIST_FILE} \
                     --throttle {{throttle}} {MONKEY_COUNT}"
                ))
            },
        );
        table.insert(
            "script",
            CommandSpec {
                setup: Some(format!("echo '{{script}}' > {MONKEY_SCRIPT_FILE}")),
                ..monkey(format!(
                    "{MONKEY_CMD} -f {MONKEY_SCRIPT_FILE} --throttle {{throttle}} {MONKEY_COUNT}"
                ))
            },
        );

        let last = StrategySpec::OneShot { is_final: true };
        table.insert("bugreport", spec("bugreport", "bugreport", last.clone()));
        table.insert("usagestats", spec("usagestats", "dumpsys usagestats", last));

        table
    }

    pub fn insert(&mut self, name: &str, spec: CommandSpec) {
        self.specs.insert(name.to_string(), spec);
    }

    pub fn with(mut self, name: &str, spec: CommandSpec) -> Self {
        self.insert(name, spec);
        self
    }

    /// Add `custom` entries, replacing built-ins of the same name.
    pub fn extend(&mut self, custom: BTreeMap<String, CommandSpec>) {
        self.specs.extend(custom);
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

fn spec(log_name: &str, cmd: &str, strategy: StrategySpec) -> CommandSpec {
    CommandSpec {
        log_name: Some(log_name.to_string()),
        cmd: cmd.to_string(),
        clean: None,
        setup: None,
        strategy,
    }
}

fn monkey(cmd: String) -> CommandSpec {
    CommandSpec {
        clean: Some(MONKEY_KILL.to_string()),
        ..spec("monkey", &cmd, StrategySpec::Durable)
    }
}

/// Bind the command `key` (described by `spec`) to `session`.
///
/// Fails with a configuration error when a template needs a parameter that
/// was not supplied; the caller skips the pair.
pub fn instantiate(
    key: &str,
    spec: &CommandSpec,
    session: &Session,
    params: &TaskParams,
    interval: Duration,
) -> Result<Box<dyn CommandTask>> {
    let name = spec.log_name.clone().unwrap_or_else(|| key.to_string());
    let command = render(&spec.cmd, params)?;
    let clean = spec
        .clean
        .as_deref()
        .map(|c| render(c, params))
        .transpose()?;
    let setup = spec
        .setup
        .as_deref()
        .map(|c| render(c, params))
        .transpose()?;
    let session = session.clone();

    let task: Box<dyn CommandTask> = match &spec.strategy {
        StrategySpec::OneShot { .. } => Box::new(OneShot::new(name, command, session)),
        StrategySpec::Loop => Box::new(PollingLoop::new(name, command, session)),
        StrategySpec::Diff { capture } => Box::new(StatefulDiff::new(
            name,
            command,
            render(capture, params)?,
            session,
        )),
        StrategySpec::Artifact {
            remote,
            period_secs,
            extension,
        } => Box::new(ArtifactPull::new(
            name,
            command,
            clean,
            render(remote, params)?,
            extension.clone(),
            PullSchedule::new(Duration::from_secs(*period_secs), interval),
            session,
        )),
        StrategySpec::Durable => Box::new(Durable::new(name, command, clean, setup, session)),
    };

    Ok(task)
}
