// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevprobeError {
    /// The device could not be reached (e.g. `adb connect` did not report
    /// success, or the device is not listed as online afterwards).
    #[error("Connection error for device {device}: {reason}")]
    Connection { device: String, reason: String },

    /// The device stayed `unauthorized` after one retry.
    #[error("Device {0} is unauthorized; accept the debugging prompt on the device")]
    Authorization(String),

    /// A remote command exited with a non-success status.
    #[error("Command `{command}` failed with exit code {code}")]
    CommandFailure { command: String, code: i32 },

    /// A remote command was killed before it finished (watchdog or
    /// teardown), so its output is not a real sample.
    #[error("Command `{0}` was killed")]
    Killed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DevprobeError {
    /// Errors that make a device unusable for the whole run.
    pub fn is_device_fatal(&self) -> bool {
        matches!(
            self,
            DevprobeError::Connection { .. } | DevprobeError::Authorization(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevprobeError>;
