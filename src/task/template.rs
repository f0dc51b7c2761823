// src/task/template.rs

//! `{placeholder}` substitution for command templates.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::errors::{DevprobeError, Result};

/// Only lowercase identifiers count, so shell braces such as
/// `awk '{print $2}'` pass through untouched.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

/// Values available to command templates (`{process}`, `{throttle}`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskParams {
    values: BTreeMap<String, String>,
}

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Fill every placeholder in `template`.
///
/// A placeholder without a value is a configuration error: the command
/// cannot run on this device as configured.
pub fn render(template: &str, params: &TaskParams) -> Result<String> {
    let mut missing: Option<String> = None;

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match params.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(key) => Err(DevprobeError::Configuration(format!(
            "`{template}` needs a value for `{key}`"
        ))),
        None => Ok(rendered.into_owned()),
    }
}
