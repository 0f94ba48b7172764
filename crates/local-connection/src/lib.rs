//! # Local Connection
//!
//! Named events with arguments, exchanged between independent execution
//! contexts (tabs, windows, tasks, processes) that share nothing but a
//! persistent store.
//!
//! ## Delivery Protocol
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │ Instance A   │                         │ Instance B   │
//! │              │  send()                 │              │
//! │  EventQueue ─┼──────┐                  │  Driver      │
//! └──────────────┘      │                  └──────┬───────┘
//!                       ▼                         │ change feed / 100ms tick
//!              ┌─────────────────┐                ▼
//!              │  Shared Store   │ ◄──── drain() (foreign records only)
//!              │  "localconnection" = [{id, event, args}, ...]
//!              └─────────────────┘                │
//!                                                 ▼
//!                                         CallbackRegistry::dispatch()
//! ```
//!
//! ## Invariants
//!
//! - An instance never receives its own events (sender id self-filter).
//! - Drained records are removed for everyone; own records stay queued.
//! - Missing or malformed queue data reads as an empty queue.
//! - Read and write-back are two separate store operations; concurrent
//!   drainers can lose one another's write-back.
//!
//! ## Crate Structure
//!
//! - `domain/` - Records, codec, configuration, errors
//! - `ports/` - The `SharedStore` and `TimeSource` traits
//! - `adapters/` - Structured store and cookie jar backends, backend probe
//! - `queue.rs` - Append and drain over the shared queue
//! - `dispatcher.rs` - Event name to callback registry
//! - `driver.rs` - Notification/polling listener
//! - `connection.rs` - The `LocalConnection` facade
//!
//! ## Usage
//!
//! ```ignore
//! use local_connection::{ConnectionConfig, LocalConnection, StructuredStore};
//! use std::sync::Arc;
//!
//! let store = StructuredStore::new();
//! let receiver = LocalConnection::new(ConnectionConfig::default(), Arc::new(store.handle()))?;
//! receiver.add_callback("startVid", |args| {
//!     println!("play {:?}", args);
//!     Ok(())
//! });
//! let _listener = receiver.listen()?;
//!
//! let sender = LocalConnection::new(ConnectionConfig::default(), Arc::new(store.handle()))?;
//! sender.send("startVid", vec![serde_json::json!("#video")])?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod connection;
pub mod dispatcher;
pub mod domain;
pub mod driver;
pub mod ports;
pub mod queue;
pub mod telemetry;

pub use adapters::storage::{probe, select_backend, CookieStore, StructuredStore};
pub use connection::LocalConnection;
pub use dispatcher::{CallbackRegistry, DispatchReport, Handler};
pub use domain::codec::{decode, encode};
pub use domain::config::{ConfigError, ConnectionConfig};
pub use domain::errors::{CodecError, ConnectionError, HandlerError, StoreError};
pub use domain::events::{EventRecord, InstanceId, ReceivedEvent};
pub use driver::{ListenMode, ListenerHandle, ListenerSlot};
pub use ports::outbound::{
    BackendKind, ChangeFeed, SharedStore, StoreChange, SystemTimeSource, TimeSource,
};
pub use queue::EventQueue;
pub use telemetry::{init_logging, LogConfig, TelemetryError};

/// Default storage key / cookie name of the shared queue.
pub const DEFAULT_CHANNEL_NAME: &str = "localconnection";

/// Default polling interval when the backend has no change notification.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Per-cookie size ceiling of the cookie jar backend, in bytes.
pub const COOKIE_CAPACITY: usize = 4096;
