//! Logging setup for hosts of the channel.
//!
//! The library itself only emits `tracing` events; binaries call
//! [`init_logging`] once at startup.

use std::env;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Logging initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {message}")]
    Filter { filter: String, message: String },

    #[error("Failed to install global subscriber: {0}")]
    Install(String),
}

/// Configuration for log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or full
    /// `EnvFilter` syntax)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to include the event target
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create configuration from environment variables.
    ///
    /// - `LC_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `LC_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("LC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            json_logs: env::var("LC_JSON_LOGS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.json_logs),
            with_target: defaults.with_target,
        }
    }

    fn filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.log_level).map_err(|e| TelemetryError::Filter {
            filter: self.log_level.clone(),
            message: e.to_string(),
        })
    }
}

/// Install the global `tracing` subscriber.
pub fn init_logging(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| TelemetryError::Install(e.to_string()))
}
