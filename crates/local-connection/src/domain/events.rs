//! # Event Records
//!
//! The records that travel through the shared queue.

use crate::ports::outbound::TimeSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Last id handed out by [`InstanceId::from_clock`] in this process.
static LAST_ISSUED: AtomicU64 = AtomicU64::new(0);

/// Identity of one running instance.
///
/// Taken from a millisecond clock at construction. Only used to tell own
/// records apart from foreign ones; it is not globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wrap an explicit id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Derive an id from the clock.
    ///
    /// Ids issued within one process are strictly increasing: when the clock
    /// has not advanced past the last issued id, the next integer is used.
    pub fn from_clock(clock: &dyn TimeSource) -> Self {
        let now = clock.now_millis();
        let previous = LAST_ISSUED
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or(now);
        Self(now.max(previous.saturating_add(1)))
    }

    /// The raw integer.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One queued event, as persisted in the shared blob.
///
/// Wire form: `{"id": <sender>, "event": <name>, "args": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Instance that wrote the record.
    #[serde(rename = "id")]
    pub sender: InstanceId,

    /// Event name as registered by receivers.
    pub event: String,

    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl EventRecord {
    pub fn new(sender: InstanceId, event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sender,
            event: event.into(),
            args,
        }
    }

    /// Whether this record was written by someone other than `reader`.
    #[must_use]
    pub fn is_foreign_to(&self, reader: InstanceId) -> bool {
        self.sender != reader
    }

    /// Strip the sender id.
    #[must_use]
    pub fn into_received(self) -> ReceivedEvent {
        ReceivedEvent {
            event: self.event,
            args: self.args,
        }
    }
}

/// A drained foreign record, sender id stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedEvent {
    pub event: String,
    pub args: Vec<Value>,
}
