//! TOML configuration loading.
//!
//! Each bench process reads exactly one file. The file carries a `[shared]`
//! table next to the process's own sections, and the caller validates the
//! parsed value before using it:
//!
//! ```rust,no_run
//! use bench_common::config::{ConfigError, ConfigLoader, SharedConfig};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct ProbeConfig {
//!     shared: SharedConfig,
//!     poll_ms: u64,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ProbeConfig::load(Path::new("config/probe.toml"))?;
//!     config.shared.validate()?;
//!     println!("{} polls every {} ms", config.shared.service_name, config.poll_ms);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file {} not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read configuration file {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// Not valid TOML, or the TOML does not match the expected shape.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed, but a value is out of range or inconsistent.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// `log_level` in the `[shared]` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// The `[shared]` table every bench config starts with.
///
/// ```toml
/// [shared]
/// service_name = "x8-agent-bench1"
/// log_level = "debug"      # optional, default "info"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance name, logged at startup.
    pub service_name: String,
}

impl SharedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shared.service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// TOML loading for any deserializable config type.
///
/// A missing file is [`ConfigError::FileNotFound`]; any other read failure
/// is [`ConfigError::Unreadable`]; bad content is [`ConfigError::ParseError`].
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.to_path_buf()),
            _ => ConfigError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Reject a value outside `[min, max]` with a named validation error.
pub fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(ConfigError::ValidationError(format!(
            "{name} {value} out of range [{min}, {max}]"
        )));
    }
    Ok(())
}

/// Reject a non-finite or non-positive value.
pub fn check_positive(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

/// Convert a seconds value to a `Duration`, rejecting negative, non-finite
/// and unrepresentable values.
pub fn check_duration(name: &str, seconds: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        ConfigError::ValidationError(format!(
            "{name} must be a representable number of seconds, got {seconds}"
        ))
    })
}
