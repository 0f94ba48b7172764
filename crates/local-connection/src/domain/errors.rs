//! # Domain Errors
//!
//! Error types for the channel.
//!
//! ## Taxonomy
//!
//! - Capability absence: never an error, the fallback backend is selected
//! - Malformed queue data: never an error, reads as an empty queue
//! - Handler failure: caught per handler, see `DispatchReport`
//! - Storage failure: `StoreError`, propagated to the caller

use crate::domain::config::ConfigError;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Storage is disabled or not present in this context.
    #[error("Storage backend unavailable")]
    Unavailable,

    /// The write would exceed the backend's quota.
    #[error("Storage quota exceeded: {requested} bytes requested, {quota} bytes allowed")]
    QuotaExceeded { requested: usize, quota: usize },

    /// Underlying I/O failure (file-backed jar).
    #[error("Storage I/O error: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io {
            message: e.to_string(),
        }
    }
}

/// Errors from encoding the queue.
///
/// Decoding never fails; see [`crate::domain::codec::decode`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode event queue: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reported by a registered callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced by `LocalConnection` and `EventQueue` operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// `listen()` called while a listener is still running.
    #[error("Connection is already listening")]
    AlreadyListening,

    /// `listen()` called outside a tokio runtime.
    #[error("No async runtime available to drive the listener")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::QuotaExceeded {
            requested: 10,
            quota: 5,
        };
        assert_eq!(
            err.to_string(),
            "Storage quota exceeded: 10 bytes requested, 5 bytes allowed"
        );
    }

    #[test]
    fn test_store_error_is_transparent_in_connection_error() {
        let err: ConnectionError = StoreError::Unavailable.into();
        assert_eq!(err.to_string(), "Storage backend unavailable");
    }

    #[test]
    fn test_handler_error_from_str() {
        let err: HandlerError = "player not ready".into();
        assert_eq!(err.message(), "player not ready");
        assert_eq!(err.to_string(), "player not ready");
    }
}
