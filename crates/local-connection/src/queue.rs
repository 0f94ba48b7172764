//! # Event Queue
//!
//! Append and drain over the shared queue blob.
//!
//! ## Drain Semantics
//!
//! ```text
//! stored:   [A:play, B:seek, A:pause, C:stop]      reader = A
//! returned: [seek, stop]                            (foreign, in order)
//! stored':  [A:play, A:pause]                       (own records remain)
//! ```
//!
//! Reading and writing back are separate store operations. Two instances
//! draining at the same time can both read the same queue, and the later
//! write-back replaces the earlier one. Records may then be delivered twice
//! or a record appended in between may be lost. There is no lock on the
//! shared medium to prevent this.

use crate::domain::codec::{decode, encode};
use crate::domain::errors::ConnectionError;
use crate::domain::events::{EventRecord, InstanceId, ReceivedEvent};
use crate::ports::outbound::SharedStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// One instance's view of the shared queue.
pub struct EventQueue {
    store: Arc<dyn SharedStore>,
    name: String,
    id: InstanceId,
    debug: bool,
}

impl EventQueue {
    pub fn new(store: Arc<dyn SharedStore>, name: impl Into<String>, id: InstanceId) -> Self {
        Self {
            store,
            name: name.into(),
            id,
            debug: false,
        }
    }

    /// Log every appended record at info level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn load(&self) -> Result<Vec<EventRecord>, ConnectionError> {
        let blob = self.store.read(&self.name)?;
        Ok(decode(blob.as_deref()))
    }

    fn persist(&self, records: &[EventRecord]) -> Result<(), ConnectionError> {
        let blob = encode(records)?;
        self.store.write(&self.name, &blob)?;
        Ok(())
    }

    /// Append an event authored by this instance. Returns `Ok(true)`.
    pub fn append(&self, event: &str, args: Vec<Value>) -> Result<bool, ConnectionError> {
        let mut records = self.load()?;
        let record = EventRecord::new(self.id, event, args);

        if self.debug {
            info!(
                sender = %self.id,
                event = %record.event,
                args = ?record.args,
                "Sending event"
            );
        }

        records.push(record);
        self.persist(&records)?;
        Ok(true)
    }

    /// Remove and return every record written by another instance.
    ///
    /// Own records stay queued. An empty queue is not written back.
    pub fn drain(&self) -> Result<Vec<ReceivedEvent>, ConnectionError> {
        let records = self.load()?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let (foreign, own): (Vec<EventRecord>, Vec<EventRecord>) = records
            .into_iter()
            .partition(|record| record.is_foreign_to(self.id));

        self.persist(&own)?;

        if !foreign.is_empty() {
            debug!(
                reader = %self.id,
                drained = foreign.len(),
                remaining = own.len(),
                "Drained foreign events"
            );
        }

        Ok(foreign.into_iter().map(EventRecord::into_received).collect())
    }

    /// Erase the whole queue, including records not yet drained by anyone.
    pub fn clear(&self) -> Result<(), ConnectionError> {
        self.store.clear(&self.name)?;
        Ok(())
    }

    /// Snapshot of the queue without consuming anything.
    pub fn pending(&self) -> Result<Vec<EventRecord>, ConnectionError> {
        self.load()
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }
}
