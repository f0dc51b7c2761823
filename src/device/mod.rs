// src/device/mod.rs

//! Device access layer.
//!
//! - [`transport`] builds `adb` invocations.
//! - [`process`] runs each invocation under a supervisor task that can kill
//!   it on request and hands back the captured output.
//! - [`session`] owns one device's connection and exposes the shell/capture
//!   primitives the command tasks are written against.

pub mod process;
pub mod session;
pub mod transport;

pub use process::{ProcessControl, ProcessExit, ProcessHandle};
pub use session::{ConnectionState, DeviceId, Session, SessionOptions};
pub use transport::Adb;
