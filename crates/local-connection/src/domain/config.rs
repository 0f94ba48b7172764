//! # Connection Configuration
//!
//! The recognized options of a connection. Unknown keys are rejected when
//! the configuration is parsed from JSON.

use crate::{DEFAULT_CHANNEL_NAME, DEFAULT_POLL_INTERVAL_MS};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The channel name cannot be used as a storage key or cookie name.
    #[error("Invalid channel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Polling interval of zero would spin.
    #[error("Poll interval must be greater than zero")]
    ZeroPollInterval,

    /// Options could not be parsed, or contained an unknown key.
    #[error("Invalid options: {0}")]
    Invalid(String),
}

/// Configuration for a `LocalConnection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Storage key (structured store) or cookie name (cookie jar) of the
    /// shared queue. Default: `"localconnection"`.
    pub name: String,

    /// Log every sent event and triggered callback. Default: `false`.
    pub debug: bool,

    /// Tick interval for backends without change notification.
    /// Default: 100ms.
    pub poll_interval: Duration,

    /// Keep pending records when the connection is created.
    ///
    /// By default a new connection clears the shared queue, discarding stale
    /// records left by contexts that are gone.
    pub preserve_on_start: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL_NAME.to_string(),
            debug: false,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            preserve_on_start: false,
        }
    }
}

/// JSON form of the options, e.g. `{"name": "player", "debug": true}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    name: Option<String>,
    debug: Option<bool>,
    poll_interval_ms: Option<u64>,
    preserve_on_start: Option<bool>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enable or disable diagnostic logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Keep pending records on construction instead of clearing them.
    pub fn with_preserve_on_start(mut self, preserve: bool) -> Self {
        self.preserve_on_start = preserve;
        self
    }

    /// Parse options from a JSON object.
    ///
    /// Recognized keys: `name`, `debug`, `poll_interval_ms`,
    /// `preserve_on_start`. Any other key is an error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawOptions =
            serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut config = Self::default();
        if let Some(name) = raw.name {
            config.name = name;
        }
        if let Some(debug) = raw.debug {
            config.debug = debug;
        }
        if let Some(ms) = raw.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(preserve) = raw.preserve_on_start {
            config.preserve_on_start = preserve;
        }
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LC_NAME`: Channel name (default: localconnection)
    /// - `LC_DEBUG`: Diagnostic logging, `1`/`true` (default: false)
    /// - `LC_POLL_INTERVAL_MS`: Polling interval (default: 100)
    /// - `LC_PRESERVE_ON_START`: Keep pending records (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            name: env::var("LC_NAME").unwrap_or(defaults.name),
            debug: env::var("LC_DEBUG")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.debug),
            poll_interval: env::var("LC_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            preserve_on_start: env::var("LC_PRESERVE_ON_START")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.preserve_on_start),
        }
    }

    /// Check that the configuration can address a store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidName {
                name: self.name.clone(),
                reason: "must not be empty",
            });
        }
        if self
            .name
            .chars()
            .any(|c| c == '=' || c == ';' || c.is_whitespace() || c.is_control())
        {
            return Err(ConfigError::InvalidName {
                name: self.name.clone(),
                reason: "must not contain '=', ';', whitespace or control characters",
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.name, "localconnection");
        assert!(!config.debug);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert!(!config.preserve_on_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::new()
            .with_name("player")
            .with_debug(true)
            .with_poll_interval(Duration::from_millis(250))
            .with_preserve_on_start(true);
        assert_eq!(config.name, "player");
        assert!(config.debug);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.preserve_on_start);
    }

    #[test]
    fn test_from_json_recognized_keys() {
        let config = ConnectionConfig::from_json(r#"{"name":"sync","debug":true}"#).unwrap();
        assert_eq!(config.name, "sync");
        assert!(config.debug);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let result = ConnectionConfig::from_json(r#"{"name":"sync","color":"red"}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_json_validates() {
        let result = ConnectionConfig::from_json(r#"{"poll_interval_ms":0}"#);
        assert_eq!(result, Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "a=b", "a;b", "a b"] {
            let config = ConnectionConfig::new().with_name(name);
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("nope"));
    }
}
