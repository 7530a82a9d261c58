//! `key=value;key=value` options understood by the built-in drivers.
//!
//! The host never looks inside a configuration string; this grammar belongs
//! to the drivers in this crate only.

use framelink_core::{PluginError, Rational};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("malformed option '{0}', expected key=value")]
    Malformed(String),
    #[error("option '{0}' given more than once")]
    Duplicate(String),
    #[error("invalid value '{value}' for option '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("missing required option '{0}'")]
    Missing(String),
    #[error("unknown option(s): {0}")]
    Unknown(String),
}

impl From<OptionsError> for PluginError {
    fn from(err: OptionsError) -> Self {
        PluginError::open_failed(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    entries: BTreeMap<String, String>,
}

impl DriverOptions {
    pub fn parse(configuration: &str) -> Result<Self, OptionsError> {
        let mut entries = BTreeMap::new();
        for part in configuration.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| OptionsError::Malformed(part.to_string()))?;
            let key = key.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(OptionsError::Malformed(part.to_string()));
            }
            if entries.insert(key.clone(), value.trim().to_string()).is_some() {
                return Err(OptionsError::Duplicate(key));
            }
        }
        Ok(Self { entries })
    }

    pub fn take_str(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Parses and removes `key`, falling back to `default` when absent.
    pub fn take<T>(&mut self, key: &str, default: T) -> Result<T, OptionsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.take_parsed(key)? {
            Some(value) => Ok(value),
            None => Ok(default),
        }
    }

    pub fn take_required<T>(&mut self, key: &str) -> Result<T, OptionsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.take_parsed(key)?
            .ok_or_else(|| OptionsError::Missing(key.to_string()))
    }

    pub fn take_parsed<T>(&mut self, key: &str) -> Result<Option<T>, OptionsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.entries.remove(key) else {
            return Ok(None);
        };
        raw.parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(key, &raw, e.to_string()))
    }

    /// Positive integer, e.g. a picture dimension.
    pub fn take_positive(&mut self, key: &str, default: Option<u32>) -> Result<u32, OptionsError> {
        let value = match self.take_parsed::<u32>(key)? {
            Some(v) => v,
            None => default.ok_or_else(|| OptionsError::Missing(key.to_string()))?,
        };
        if value == 0 {
            return Err(invalid(key, "0", "must be greater than zero"));
        }
        Ok(value)
    }

    /// `N`, `N/D` or `N:D` with non-zero parts.
    pub fn take_rational(&mut self, key: &str, default: Rational) -> Result<Rational, OptionsError> {
        let Some(raw) = self.entries.remove(key) else {
            return Ok(default);
        };
        parse_rational(&raw).ok_or_else(|| invalid(key, &raw, "expected N, N/D or N:D"))
    }

    /// Errors if any option was not consumed by the driver.
    pub fn finish(self) -> Result<(), OptionsError> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        Err(OptionsError::Unknown(keys.join(", ")))
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> OptionsError {
    OptionsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_rational(raw: &str) -> Option<Rational> {
    let (num, den) = match raw.split_once(['/', ':']) {
        Some((n, d)) => (n.trim().parse().ok()?, d.trim().parse().ok()?),
        None => (raw.trim().parse().ok()?, 1),
    };
    (num != 0 && den != 0).then(|| Rational::new(num, den))
}
