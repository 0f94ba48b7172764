//! # Listener Driver
//!
//! Runs drain-then-dispatch whenever the shared queue may have changed.
//!
//! ```text
//!            listen()                 cancel() / drop
//!   Idle ──────────────► Listening ───────────────────► Stopped
//!                           │
//!             ┌─────────────┴──────────────┐
//!   change feed (structured)       interval tick (cookie jar)
//!             └─────────────┬──────────────┘
//!                           ▼
//!                 EventQueue::drain()
//!                           ▼
//!             CallbackRegistry::dispatch() per event
//! ```

use crate::dispatcher::CallbackRegistry;
use crate::domain::errors::ConnectionError;
use crate::ports::outbound::{ChangeFeed, SharedStore};
use crate::queue::EventQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// What wakes the listener.
pub enum Trigger {
    /// Store change notifications from other contexts.
    Notify(ChangeFeed),
    /// Fixed-interval polling.
    Poll(Duration),
}

/// How a running listener is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    Notification,
    Polling,
}

/// Drain the queue and hand every foreign event to the registry.
#[derive(Clone)]
pub struct Pump {
    queue: Arc<EventQueue>,
    registry: CallbackRegistry,
    blocking: bool,
}

impl Pump {
    pub fn new(queue: Arc<EventQueue>, registry: CallbackRegistry) -> Self {
        let blocking = queue.store().is_blocking();
        Self {
            queue,
            registry,
            blocking,
        }
    }

    /// One drain-then-dispatch pass. Returns the number of events drained.
    pub fn run_once(&self) -> Result<usize, ConnectionError> {
        let events = self.queue.drain()?;
        for event in &events {
            self.registry.dispatch(&event.event, &event.args);
        }
        Ok(events.len())
    }

    fn tick(&self) {
        if let Err(e) = self.run_once() {
            warn!(
                channel = self.queue.name(),
                error = %e,
                "Failed to drain event queue"
            );
        }
    }

    /// A tick from the listener loop. Stores doing file I/O drain on the
    /// blocking pool.
    async fn step(&self) {
        if !self.blocking {
            self.tick();
            return;
        }
        let pump = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || pump.tick()).await {
            warn!(channel = self.queue.name(), error = %e, "Drain task ended abnormally");
        }
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// The single listener a connection may run at a time.
///
/// Holds the token of the owning listener, `0` when free. Only the owner can
/// free the slot, so a stopping listener never releases a newer one.
#[derive(Debug, Clone, Default)]
pub struct ListenerSlot(Arc<AtomicU64>);

impl ListenerSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.0.load(Ordering::SeqCst) != 0
    }

    fn claim(&self) -> Option<u64> {
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        self.0
            .compare_exchange(0, token, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| token)
    }

    fn release(&self, token: u64) {
        let _ = self
            .0
            .compare_exchange(token, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

/// Frees the slot when the loop ends, however it ends.
struct ActiveGuard {
    slot: ListenerSlot,
    token: u64,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.slot.release(self.token);
    }
}

/// Handle to a running listener.
///
/// Dropping the handle stops the listener and frees the slot at once, so a
/// new listener can start while the old loop winds down. A tick already in
/// progress in the old loop still completes. `cancel` additionally waits for
/// the loop to finish.
pub struct ListenerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    mode: ListenMode,
    slot: ListenerSlot,
    token: u64,
}

impl ListenerHandle {
    /// Stop listening and wait for the loop to exit.
    pub async fn cancel(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Listener task ended abnormally");
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    #[must_use]
    pub fn mode(&self) -> ListenMode {
        self.mode
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.slot.release(self.token);
    }
}

/// Start a listener on the current tokio runtime.
///
/// The slot stays occupied until the handle is dropped or the loop ends.
pub fn spawn(
    pump: Pump,
    trigger: Trigger,
    slot: ListenerSlot,
) -> Result<ListenerHandle, ConnectionError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;
    let token = slot.claim().ok_or(ConnectionError::AlreadyListening)?;
    let mode = match trigger {
        Trigger::Notify(_) => ListenMode::Notification,
        Trigger::Poll(_) => ListenMode::Polling,
    };
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let guard = ActiveGuard {
        slot: slot.clone(),
        token,
    };
    let task = runtime.spawn(async move {
        let _guard = guard;
        run(pump, trigger, shutdown_rx).await;
    });

    Ok(ListenerHandle {
        shutdown_tx,
        task: Some(task),
        mode,
        slot,
        token,
    })
}

async fn run(pump: Pump, trigger: Trigger, mut shutdown: watch::Receiver<bool>) {
    let channel = pump.queue.name().to_string();

    match trigger {
        Trigger::Notify(mut feed) => {
            debug!(channel = %channel, "Listening for storage changes");
            // Pick up anything queued before the subscription existed.
            pump.step().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    change = feed.changed() => match change {
                        Some(_) => pump.step().await,
                        None => {
                            debug!(channel = %channel, "Change feed closed");
                            break;
                        }
                    },
                }
            }
        }
        Trigger::Poll(period) => {
            debug!(channel = %channel, period_ms = period.as_millis() as u64, "Polling shared queue");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => pump.step().await,
                }
            }
        }
    }

    debug!(channel = %channel, "Listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::{CookieStore, StructuredStore};
    use crate::domain::events::InstanceId;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn receiving_pump(
        store: Arc<dyn SharedStore>,
        id: u64,
    ) -> (Pump, mpsc::UnboundedReceiver<(String, Vec<Value>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = CallbackRegistry::new();
        for name in ["play", "pause"] {
            let tx = tx.clone();
            registry.register(name, move |args| {
                let _ = tx.send((name.to_string(), args.to_vec()));
                Ok(())
            });
        }
        let queue = Arc::new(EventQueue::new(store, "lc", InstanceId::new(id)));
        (Pump::new(queue, registry), rx)
    }

    #[test]
    fn test_run_once_dispatches_drained_events() {
        let store = StructuredStore::new();
        let sender = EventQueue::new(Arc::new(store.handle()), "lc", InstanceId::new(1));
        let (pump, mut rx) = receiving_pump(Arc::new(store.handle()), 2);

        sender.append("play", vec![json!("video1")]).unwrap();
        sender.append("unhandled", vec![]).unwrap();

        assert_eq!(pump.run_once().unwrap(), 2);
        assert_eq!(rx.try_recv().unwrap(), ("play".to_string(), vec![json!("video1")]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notification_listener_delivers() {
        let store = StructuredStore::new();
        let sender = EventQueue::new(Arc::new(store.handle()), "lc", InstanceId::new(1));
        let receiver_store: Arc<dyn SharedStore> = Arc::new(store.handle());
        let feed = receiver_store.subscribe("lc").unwrap();
        let (pump, mut rx) = receiving_pump(receiver_store, 2);
        let slot = ListenerSlot::new();

        let handle = spawn(pump, Trigger::Notify(feed), slot.clone()).unwrap();
        assert_eq!(handle.mode(), ListenMode::Notification);
        assert!(slot.is_occupied());

        sender.append("pause", vec![]).unwrap();

        let got = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(got, ("pause".to_string(), vec![]));

        handle.cancel().await;
        assert!(!slot.is_occupied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_listener_delivers_and_stops() {
        let jar = CookieStore::in_memory();
        let sender = EventQueue::new(Arc::new(jar.handle()), "lc", InstanceId::new(1));
        let (pump, mut rx) = receiving_pump(Arc::new(jar.handle()), 2);
        let slot = ListenerSlot::new();

        let handle = spawn(pump, Trigger::Poll(Duration::from_millis(100)), slot.clone()).unwrap();
        assert_eq!(handle.mode(), ListenMode::Polling);

        sender.append("play", vec![json!(1)]).unwrap();
        let got = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(got, ("play".to_string(), vec![json!(1)]));

        handle.cancel().await;
        assert!(!slot.is_occupied());

        sender.append("play", vec![json!(2)]).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_listener() {
        let jar = CookieStore::in_memory();
        let (pump, _rx) = receiving_pump(Arc::new(jar.handle()), 2);
        let slot = ListenerSlot::new();

        let handle = spawn(pump, Trigger::Poll(Duration::from_millis(100)), slot.clone()).unwrap();
        drop(handle);
        assert!(!slot.is_occupied());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!slot.is_occupied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_occupied_slot_rejects_second_listener() {
        let jar = CookieStore::in_memory();
        let (first, _rx1) = receiving_pump(Arc::new(jar.handle()), 2);
        let (second, _rx2) = receiving_pump(Arc::new(jar.handle()), 2);
        let slot = ListenerSlot::new();

        let handle = spawn(first, Trigger::Poll(Duration::from_millis(100)), slot.clone()).unwrap();
        let result = spawn(second, Trigger::Poll(Duration::from_millis(100)), slot.clone());
        assert!(matches!(result, Err(ConnectionError::AlreadyListening)));
        assert!(slot.is_occupied());

        handle.cancel().await;
        assert!(!slot.is_occupied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_listener_does_not_free_newer_one() {
        let jar = CookieStore::in_memory();
        let sender = EventQueue::new(Arc::new(jar.handle()), "lc", InstanceId::new(1));
        let (old, _old_rx) = receiving_pump(Arc::new(jar.handle()), 2);
        let (new, mut rx) = receiving_pump(Arc::new(jar.handle()), 2);
        let slot = ListenerSlot::new();

        let stale = spawn(old, Trigger::Poll(Duration::from_millis(100)), slot.clone()).unwrap();
        drop(stale);
        let handle = spawn(new, Trigger::Poll(Duration::from_millis(100)), slot.clone()).unwrap();

        // The old loop exits here; its guard must leave the slot alone.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(slot.is_occupied());
        assert!(handle.is_running());

        sender.append("play", vec![json!(3)]).unwrap();
        let got = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(got, ("play".to_string(), vec![json!(3)]));

        handle.cancel().await;
        assert!(!slot.is_occupied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_listener_survives_failed_drain() {
        let store = StructuredStore::new();
        let sender = EventQueue::new(Arc::new(store.handle()), "lc", InstanceId::new(1));
        let (pump, mut rx) = receiving_pump(Arc::new(store.handle()), 2);

        store.set_available(false);
        let handle = spawn(pump, Trigger::Poll(Duration::from_millis(100)), ListenerSlot::new()).unwrap();

        // Ticks at 0ms and 100ms both fail to read the queue.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(handle.is_running());
        assert!(rx.try_recv().is_err());

        store.set_available(true);
        sender.append("play", vec![json!("after outage")]).unwrap();
        let got = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(got, ("play".to_string(), vec![json!("after outage")]));
        assert!(handle.is_running());

        handle.cancel().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_jar_listener_drains_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.jar");
        let sender = EventQueue::new(Arc::new(CookieStore::open(&path)), "lc", InstanceId::new(1));
        let (pump, mut rx) = receiving_pump(Arc::new(CookieStore::open(&path)), 2);
        assert!(pump.blocking);

        let handle = spawn(pump, Trigger::Poll(Duration::from_millis(20)), ListenerSlot::new()).unwrap();

        for i in 0..3 {
            sender.append("play", vec![json!(i)]).unwrap();
            let got = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timeout")
                .expect("event");
            assert_eq!(got, ("play".to_string(), vec![json!(i)]));
        }

        handle.cancel().await;
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let jar = CookieStore::in_memory();
        let (pump, _rx) = receiving_pump(Arc::new(jar), 2);
        let result = spawn(pump, Trigger::Poll(Duration::from_millis(100)), ListenerSlot::new());
        assert!(matches!(result, Err(ConnectionError::NoRuntime)));
    }
}
