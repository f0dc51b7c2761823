// src/layout.rs

//! On-disk layout of a collection run.
//!
//! ```text
//! <log root>/<YYYY.mm.dd-HH.MM.SS>/<device>/<task>.txt
//! <log root>/<YYYY.mm.dd-HH.MM.SS>/<device>/<task>_<YYYYmmdd_HHMMSS>.<ext>
//! ```
//!
//! Append-mode logs separate cycles with a `>>MM/DD HH:MM:SS>>` marker line,
//! which is what the report side splits on.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use tracing::info;

use crate::errors::Result;

const RUN_DIR_FORMAT: &str = "%Y.%m.%d-%H.%M.%S";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const BLOCK_FORMAT: &str = "%m/%d %H:%M:%S";

/// Create `<root>/<run timestamp>/` and return it.
pub fn create_run_dir(root: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    let dir = root.join(now.format(RUN_DIR_FORMAT).to_string());
    if !dir.is_dir() {
        info!(dir = ?dir, "create log dir");
        fs::create_dir_all(&dir).with_context(|| format!("creating log dir {:?}", dir))?;
    }
    Ok(dir)
}

/// `<dir>/<name>.txt`, shared by every cycle of a task.
pub fn log_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.txt"))
}

/// `<dir>/<name>_<timestamp>.<ext>` that does not exist yet.
///
/// Two snapshots within the same second get `_1`, `_2`, ... suffixes instead
/// of overwriting each other.
pub fn stamped_file(dir: &Path, name: &str, ext: &str, now: DateTime<Local>) -> PathBuf {
    let stem = format!("{name}_{}", now.format(STAMP_FORMAT));
    let mut path = dir.join(format!("{stem}.{ext}"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.{ext}"));
        n += 1;
    }
    path
}

/// Marker line that precedes each cycle's block in an append-mode log.
pub fn block_header(now: DateTime<Local>) -> String {
    format!(">>{}>>", now.format(BLOCK_FORMAT))
}

/// Append one timestamped block.
pub fn append_block(path: &Path, now: DateTime<Local>, output: &str) -> Result<()> {
    append(path, &format!("{}\n{}\n", block_header(now), output))
}

/// Append raw text.
pub fn append(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {:?}", path))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("writing to log file {:?}", path))?;
    Ok(())
}
