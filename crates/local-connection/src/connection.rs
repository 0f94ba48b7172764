//! # Local Connection
//!
//! The public face of the channel: send events, register callbacks, listen.

use crate::adapters::storage::select_backend;
use crate::dispatcher::{CallbackRegistry, DispatchReport};
use crate::domain::config::ConnectionConfig;
use crate::domain::errors::{ConnectionError, HandlerError};
use crate::domain::events::{EventRecord, InstanceId};
use crate::driver::{self, ListenerHandle, ListenerSlot, Pump, Trigger};
use crate::ports::outbound::{BackendKind, SharedStore, SystemTimeSource, TimeSource};
use crate::queue::EventQueue;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// One instance of the channel, bound to one execution context.
pub struct LocalConnection {
    config: ConnectionConfig,
    queue: Arc<EventQueue>,
    registry: CallbackRegistry,
    listening: ListenerSlot,
}

impl LocalConnection {
    /// Create a connection over `store`, with an id taken from the clock.
    pub fn new(
        config: ConnectionConfig,
        store: Arc<dyn SharedStore>,
    ) -> Result<Self, ConnectionError> {
        let id = InstanceId::from_clock(&SystemTimeSource);
        Self::with_id(config, store, id)
    }

    /// Create a connection with an explicit instance id.
    pub fn with_id(
        config: ConnectionConfig,
        store: Arc<dyn SharedStore>,
        id: InstanceId,
    ) -> Result<Self, ConnectionError> {
        config.validate()?;

        let queue = Arc::new(EventQueue::new(store, config.name.clone(), id).with_debug(config.debug));
        let registry = CallbackRegistry::new().with_debug(config.debug);

        if !config.preserve_on_start {
            queue.clear()?;
        }

        debug!(
            id = %id,
            channel = %config.name,
            backend = %queue.store().backend_kind(),
            "Local connection created"
        );

        Ok(Self {
            config,
            queue,
            registry,
            listening: ListenerSlot::new(),
        })
    }

    /// Create a connection over the preferred store if it passes the probe,
    /// otherwise over `fallback`.
    pub fn with_backends(
        config: ConnectionConfig,
        preferred: Option<Arc<dyn SharedStore>>,
        fallback: Arc<dyn SharedStore>,
    ) -> Result<Self, ConnectionError> {
        Self::with_backends_and_clock(config, preferred, fallback, &SystemTimeSource)
    }

    /// As [`LocalConnection::with_backends`], with an injected clock.
    pub fn with_backends_and_clock(
        config: ConnectionConfig,
        preferred: Option<Arc<dyn SharedStore>>,
        fallback: Arc<dyn SharedStore>,
        clock: &dyn TimeSource,
    ) -> Result<Self, ConnectionError> {
        let id = InstanceId::from_clock(clock);
        let store = select_backend(preferred, fallback, &id.to_string());
        Self::with_id(config, store, id)
    }

    /// Queue an event for every other instance. Returns `Ok(true)`.
    pub fn send(&self, event: &str, args: Vec<Value>) -> Result<bool, ConnectionError> {
        self.queue.append(event, args)
    }

    /// Register a callback for `event`. Callbacks run in registration order.
    pub fn add_callback<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(event, handler);
    }

    /// Remove every callback for `event`.
    pub fn remove_callback(&self, event: &str) -> bool {
        self.registry.unregister(event)
    }

    /// Start delivering foreign events to the registered callbacks.
    ///
    /// Uses the store's change notification when it has one, otherwise polls
    /// every `poll_interval`. Must be called within a tokio runtime. Fails
    /// with `AlreadyListening` while a previous [`ListenerHandle`] is alive;
    /// dropping that handle makes `listen` available again immediately.
    pub fn listen(&self) -> Result<ListenerHandle, ConnectionError> {
        if self.listening.is_occupied() {
            return Err(ConnectionError::AlreadyListening);
        }

        let store = self.queue.store();
        let trigger = match store
            .supports_change_notification()
            .then(|| store.subscribe(&self.config.name))
            .flatten()
        {
            Some(feed) => Trigger::Notify(feed),
            None => Trigger::Poll(self.config.poll_interval),
        };

        let pump = Pump::new(self.queue.clone(), self.registry.clone());
        let handle = driver::spawn(pump, trigger, self.listening.clone())?;
        info!(
            id = %self.id(),
            channel = %self.config.name,
            mode = ?handle.mode(),
            "Listening for events"
        );
        Ok(handle)
    }

    /// Drain once and dispatch, without a listener. Returns the number of
    /// events drained.
    pub fn poll_once(&self) -> Result<usize, ConnectionError> {
        Pump::new(self.queue.clone(), self.registry.clone()).run_once()
    }

    /// Dispatch an event to local callbacks directly, bypassing the store.
    pub fn dispatch_local(&self, event: &str, args: &[Value]) -> DispatchReport {
        self.registry.dispatch(event, args)
    }

    /// Erase every pending record, including undrained foreign ones.
    pub fn clear(&self) -> Result<(), ConnectionError> {
        self.queue.clear()
    }

    /// Records currently queued, without consuming them.
    pub fn pending(&self) -> Result<Vec<EventRecord>, ConnectionError> {
        self.queue.pending()
    }

    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.queue.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.queue.store().backend_kind()
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.is_occupied()
    }
}
