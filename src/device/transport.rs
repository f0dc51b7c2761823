// src/device/transport.rs

use std::ffi::OsStr;

use tokio::process::Command;

/// The `adb` program and the command lines built from it.
///
/// The program path is configurable so a stand-in script can be used in
/// tests (or a specific SDK install in production).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adb {
    program: String,
}

impl Adb {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `adb <args...>`, not bound to a device (connect, devices, ...).
    pub fn host_command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }

    /// `adb -s <address> <args...>`.
    pub fn device_command<I, S>(&self, address: &str, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-s").arg(address).args(args);
        cmd
    }

    /// `adb -s <address> shell "<command>"`.
    ///
    /// The remote command is passed as a single argument; the device-side
    /// shell does the word splitting.
    pub fn shell_command(&self, address: &str, command: &str) -> Command {
        self.device_command(address, ["shell", command])
    }
}

impl Default for Adb {
    fn default() -> Self {
        Self::new("adb")
    }
}
