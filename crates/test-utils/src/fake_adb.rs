use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use devprobe::device::Adb;
use tempfile::TempDir;

/// `sh` script standing in for `adb`.
///
/// - every invocation is appended to `invocations.log` (one line, args
///   joined by spaces, any leading `-s <address>` included);
/// - `connect <id>` prints `connected to <id>:5555` unless `refuse_connect`
///   exists;
/// - `devices` lists every connected id as `device`, or `unauthorized` while
///   `unauthorized` exists (`unauthorized_once` is consumed by one listing);
/// - `shell <cmd>` runs `<cmd>` locally with `sh -c`;
/// - `pull <remote> <local>` copies a local file.
const SCRIPT: &str = r#"#!/bin/sh
dir="$(cd "$(dirname "$0")" && pwd)"
echo "$*" >> "$dir/invocations.log"
if [ "$1" = "-s" ]; then
  shift 2
fi
case "$1" in
  connect)
    if [ -e "$dir/refuse_connect" ]; then
      echo "failed to connect to '$2:5555': Connection refused"
      exit 1
    fi
    echo "$2" >> "$dir/connected"
    echo "connected to $2:5555"
    ;;
  disconnect)
    echo "disconnected $2"
    ;;
  devices)
    state=device
    if [ -e "$dir/unauthorized" ]; then
      state=unauthorized
    fi
    if [ -e "$dir/unauthorized_once" ]; then
      rm -f "$dir/unauthorized_once"
      state=unauthorized
    fi
    echo "List of devices attached"
    if [ -e "$dir/connected" ]; then
      sort -u "$dir/connected" | while read -r id; do
        printf '%s:5555\t%s\n' "$id" "$state"
      done
    fi
    ;;
  shell)
    exec sh -c "$2"
    ;;
  pull)
    cp "$2" "$3"
    ;;
  *)
    echo "fake adb: unsupported command $1" >&2
    exit 1
    ;;
esac
"#;

pub struct FakeAdb {
    dir: TempDir,
    program: PathBuf,
}

impl FakeAdb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create fake adb dir");
        let program = dir.path().join("adb");
        fs::write(&program, SCRIPT).expect("write fake adb script");
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))
            .expect("make fake adb executable");
        Self { dir, program }
    }

    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    pub fn adb(&self) -> Adb {
        Adb::new(self.program())
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Create (or remove) a control file such as `refuse_connect`.
    pub fn set_flag(&self, name: &str, on: bool) {
        let path = self.dir.path().join(name);
        if on {
            fs::write(path, "").expect("write fake adb flag");
        } else {
            let _ = fs::remove_file(path);
        }
    }

    /// Every recorded invocation, oldest first.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("invocations.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Invocations whose first adb subcommand is `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|line| {
                let mut words = line.split_whitespace();
                let mut first = words.next();
                if first == Some("-s") {
                    words.next();
                    first = words.next();
                }
                first == Some(subcommand)
            })
            .count()
    }
}

impl Default for FakeAdb {
    fn default() -> Self {
        Self::new()
    }
}
