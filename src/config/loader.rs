// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::cli::CliArgs;
use crate::config::model::{RawConfigFile, RunConfig};
use crate::config::validate::resolve;
use crate::errors::Result;

/// Read a config file. Only TOML deserialization happens here; see
/// [`load_and_resolve`] for the merged, validated form.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(path = ?path, commands = config.command.len(), "config file loaded");

    Ok(config)
}

/// Entry point for the rest of the application: read `--config` if given,
/// then merge it under the command line and validate.
pub fn load_and_resolve(cli: &CliArgs) -> Result<RunConfig> {
    let raw = match &cli.config {
        Some(path) => load_from_path(path)?,
        None => RawConfigFile::default(),
    };
    resolve(cli, raw)
}
