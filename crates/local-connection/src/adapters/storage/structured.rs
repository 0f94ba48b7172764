use crate::domain::errors::StoreError;
use crate::ports::outbound::{BackendKind, ChangeFeed, SharedStore, StoreChange};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

struct Shared {
    data: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<StoreChange>,
    available: AtomicBool,
    quota: Option<usize>,
    next_origin: AtomicU64,
}

/// Key/value store with change notification, shared by many contexts.
///
/// Each value of this type is one context's handle; `handle()` opens
/// another context on the same data. A write notifies every other handle
/// subscribed to the key, never the writer, and only when the stored value
/// actually changes.
pub struct StructuredStore {
    shared: Arc<Shared>,
    origin: u64,
}

impl StructuredStore {
    /// Create an empty store with no quota.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty store limited to `bytes` of keys and values in total.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(quota: Option<usize>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(HashMap::new()),
                changes,
                available: AtomicBool::new(true),
                quota,
                next_origin: AtomicU64::new(1),
            }),
            origin: 0,
        }
    }

    /// Open another execution context on the same store.
    #[must_use]
    pub fn handle(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            origin: self.shared.next_origin.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Enable or disable the store for every handle. A disabled store fails
    /// every operation with `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Origin tag attached to this handle's change notifications.
    #[must_use]
    pub fn origin(&self) -> u64 {
        self.origin
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.shared.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn notify(&self, name: &str, value: Option<String>) {
        // No subscribers is not an error.
        let _ = self.shared.changes.send(StoreChange {
            origin: self.origin,
            name: name.to_string(),
            value,
        });
    }
}

impl Default for StructuredStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for StructuredStore {
    fn write(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_available()?;

        let changed = {
            let mut data = self.shared.data.write();
            if let Some(quota) = self.shared.quota {
                let others: usize = data
                    .iter()
                    .filter(|(k, _)| k.as_str() != name)
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                let requested = others + name.len() + value.len();
                if requested > quota {
                    return Err(StoreError::QuotaExceeded { requested, quota });
                }
            }
            let previous = data.insert(name.to_string(), value.to_string());
            previous.as_deref() != Some(value)
        };

        if changed {
            self.notify(name, Some(value.to_string()));
        }
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.ensure_available()?;
        Ok(self.shared.data.read().get(name).cloned())
    }

    fn clear(&self, name: &str) -> Result<(), StoreError> {
        self.ensure_available()?;
        let removed = self.shared.data.write().remove(name).is_some();
        if removed {
            self.notify(name, None);
        }
        Ok(())
    }

    fn supports_change_notification(&self) -> bool {
        true
    }

    fn subscribe(&self, name: &str) -> Option<ChangeFeed> {
        Some(ChangeFeed::new(
            self.shared.changes.subscribe(),
            self.origin,
            name,
        ))
    }

    fn backend_kind(&self) -> BackendKind {
        BackendKind::Structured
    }
}
