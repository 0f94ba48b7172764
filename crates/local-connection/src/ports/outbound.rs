//! # Outbound Ports (Driven Ports)
//!
//! Dependencies required by the channel: the shared store that carries the
//! queue, and a clock for instance identity.

use crate::domain::errors::StoreError;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Which persistence mechanism backs a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Key/value store with change notification.
    Structured,
    /// Shared cookie string, polled.
    CookieJar,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Structured => write!(f, "structured"),
            BackendKind::CookieJar => write!(f, "cookie-jar"),
        }
    }
}

/// Abstract interface for the shared storage medium.
///
/// One value of an implementing type stands for one execution context's view
/// of the store. Reads and writes are independent operations: there is no
/// atomic read-modify-write.
///
/// Production: `StructuredStore` (preferred), `CookieStore` (fallback).
pub trait SharedStore: Send + Sync {
    /// Replace the value stored under `name`.
    fn write(&self, name: &str, value: &str) -> Result<(), StoreError>;

    /// Read the value stored under `name`, `None` if absent.
    fn read(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Erase the value stored under `name`.
    fn clear(&self, name: &str) -> Result<(), StoreError>;

    /// Whether `subscribe` yields a change feed.
    fn supports_change_notification(&self) -> bool;

    /// Feed of changes to `name` made by *other* contexts.
    ///
    /// Writes through this context never appear on its own feed.
    fn subscribe(&self, name: &str) -> Option<ChangeFeed>;

    fn backend_kind(&self) -> BackendKind;

    /// Whether operations do blocking file I/O and belong off the async
    /// worker threads.
    fn is_blocking(&self) -> bool {
        false
    }
}

/// A mutation broadcast by a store with change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Context that made the change.
    pub origin: u64,
    /// Key that changed.
    pub name: String,
    /// New value, `None` once cleared.
    pub value: Option<String>,
}

/// Change notifications for one key, as seen by one context.
pub struct ChangeFeed {
    receiver: broadcast::Receiver<StoreChange>,
    origin: u64,
    name: String,
}

impl ChangeFeed {
    /// Create a feed that skips changes made by `origin` and changes to keys
    /// other than `name`.
    pub fn new(receiver: broadcast::Receiver<StoreChange>, origin: u64, name: impl Into<String>) -> Self {
        Self {
            receiver,
            origin,
            name: name.into(),
        }
    }

    /// Wait for the next foreign change to this key.
    ///
    /// Returns `Some(new_value)` per change (`Some(None)` when cleared or
    /// when notifications were skipped), `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Option<String>> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => {
                    if change.origin == self.origin || change.name != self.name {
                        continue;
                    }
                    return Some(change.value);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    // Skipped notifications only mean the queue changed more
                    // than once; one drain picks all of it up.
                    debug!(lagged = count, key = %self.name, "Change feed lagged");
                    return Some(None);
                }
            }
        }
    }

    /// Key this feed watches.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Abstract interface for time operations (for testability).
pub trait TimeSource: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Default time source using system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
