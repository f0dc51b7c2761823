// src/config/mod.rs

//! Configuration for devprobe.
//!
//! - `model.rs`: the TOML data model and the resolved [`RunConfig`].
//! - `loader.rs`: read a config file from disk.
//! - `validate.rs`: merge CLI and file, apply defaults, reject bad input.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_resolve, load_from_path};
pub use model::{
    CommandSpec, MonkeyOptions, MonkeySection, RawConfigFile, RunConfig, RunSection,
    StrategySpec, WatchdogSection,
};
pub use validate::resolve;
