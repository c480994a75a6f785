//! Event callback registry.

use crate::events::{Event, EventKind};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the broadcast subscription.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// A registered callback.
pub type Listener = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Routes domain events to registered callbacks.
///
/// Every callback runs as its own task; publishing never waits on them.
pub struct EventBus {
    listeners: DashMap<EventKind, Vec<Listener>>,
    sender: broadcast::Sender<Arc<Event>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            sender,
        }
    }

    /// Register an async callback for one event kind.
    pub fn register<F, Fut>(&self, kind: EventKind, callback: F)
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener: Listener = Arc::new(move |event| callback(event).boxed());
        self.listeners.entry(kind).or_default().push(listener);
    }

    /// Schedule every callback registered for the event's kind.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn invoke(&self, event: Event) {
        let kind = event.kind();
        let event = Arc::new(event);

        // Clone out so no map guard is held while spawning.
        let listeners = self.listeners(kind);
        trace!(event = %kind, listeners = listeners.len(), "Invoking event");
        for listener in listeners {
            tokio::spawn(listener(Arc::clone(&event)));
        }

        let _ = self.sender.send(event);
    }

    /// Receive every event as it is published.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn listeners(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Remove every callback for a kind. Returns how many were removed.
    pub fn clear(&self, kind: EventKind) -> usize {
        self.listeners
            .remove(&kind)
            .map_or(0, |(_, listeners)| listeners.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.listeners.len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
