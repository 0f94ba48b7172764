//! # Queue Codec
//!
//! Moves the ordered queue in and out of the single text blob kept by the
//! storage backend. The blob is a JSON array of `{id, event, args}` objects.

use crate::domain::errors::CodecError;
use crate::domain::events::EventRecord;
use tracing::debug;

/// Serialize the queue.
pub fn encode(records: &[EventRecord]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(records)?)
}

/// Deserialize the queue.
///
/// Missing, empty or malformed blobs yield an empty queue. This never fails.
#[must_use]
pub fn decode(blob: Option<&str>) -> Vec<EventRecord> {
    let Some(blob) = blob else {
        return Vec::new();
    };
    if blob.trim().is_empty() {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<EventRecord>>(blob) {
        Ok(records) => records,
        Err(e) => {
            debug!(error = %e, len = blob.len(), "Discarding malformed event queue");
            Vec::new()
        }
    }
}
