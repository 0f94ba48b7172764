//! # Callback Registry
//!
//! Maps event names to ordered lists of callbacks.
//!
//! Callbacks are closures; whatever state they act on is captured by the
//! closure. Registering the same closure twice makes it run twice per event.
//! A callback that fails or panics is logged and skipped, and the remaining
//! callbacks for the event still run.

use crate::domain::errors::HandlerError;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

/// A registered callback, invoked with the event's positional arguments.
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync>;

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Callbacks that were called.
    pub invoked: usize,
    /// Callbacks that returned an error or panicked.
    pub failed: usize,
}

impl DispatchReport {
    /// Whether any callback was registered for the event.
    #[must_use]
    pub fn delivered(&self) -> bool {
        self.invoked > 0
    }
}

/// Shared registry of callbacks. Clones share the same registrations.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    handlers: Arc<RwLock<HashMap<String, Vec<Handler>>>>,
    debug: bool,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every triggered callback at info level.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Append a callback for `event`.
    pub fn register<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(event.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Remove every callback for `event`. Returns whether any existed.
    pub fn unregister(&self, event: &str) -> bool {
        self.handlers.write().remove(event).is_some()
    }

    /// Call every callback for `event`, in registration order.
    pub fn dispatch(&self, event: &str, args: &[Value]) -> DispatchReport {
        // Clone out of the lock so callbacks may (un)register.
        let handlers: Vec<Handler> = match self.handlers.read().get(event) {
            Some(list) => list.clone(),
            None => return DispatchReport::default(),
        };

        let mut report = DispatchReport::default();
        for (index, handler) in handlers.iter().enumerate() {
            if self.debug {
                info!(event, index, args = ?args, "Triggering callback");
            }
            report.invoked += 1;

            match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(event, index, error = %e, "Callback failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        event,
                        index,
                        panic = panic_message(panic.as_ref()),
                        "Callback panicked"
                    );
                }
            }
        }
        report
    }

    /// Number of callbacks registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
