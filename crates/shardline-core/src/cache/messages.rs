//! Bounded message store.

use crate::id::{marker::MessageMarker, Id};
use crate::model::Message;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

struct Inner {
    messages: HashMap<Id<MessageMarker>, Message>,
    order: VecDeque<Id<MessageMarker>>,
}

/// FIFO of the most recently received messages.
///
/// Once `capacity` messages are stored, inserting evicts the oldest first.
/// A capacity of zero disables message caching.
pub struct MessageStore {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl MessageStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                messages: HashMap::with_capacity(capacity.min(1024)),
                order: VecDeque::with_capacity(capacity.min(1024)),
            }),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a message, returning whatever had to be evicted to make room.
    ///
    /// Re-inserting a known id replaces it without changing its position.
    /// With a zero capacity the message itself is returned.
    pub fn insert(&self, message: Message) -> Vec<Message> {
        if self.capacity == 0 {
            return vec![message];
        }

        let mut inner = self.inner.lock();
        if let Some(existing) = inner.messages.get_mut(&message.id) {
            *existing = message;
            return Vec::new();
        }

        let mut evicted = Vec::new();
        while inner.messages.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(message) = inner.messages.remove(&oldest) {
                evicted.push(message);
            }
        }

        inner.order.push_back(message.id);
        inner.messages.insert(message.id, message);
        evicted
    }

    #[must_use]
    pub fn get(&self, id: Id<MessageMarker>) -> Option<Message> {
        self.inner.lock().messages.get(&id).cloned()
    }

    pub fn remove(&self, id: Id<MessageMarker>) -> Option<Message> {
        let mut inner = self.inner.lock();
        let message = inner.messages.remove(&id)?;
        inner.order.retain(|queued| *queued != id);
        Some(message)
    }

    pub fn update<F>(&self, id: Id<MessageMarker>, f: F) -> Option<(Message, Message)>
    where
        F: FnOnce(&mut Message),
    {
        let mut inner = self.inner.lock();
        let message = inner.messages.get_mut(&id)?;
        let before = message.clone();
        f(message);
        Some((before, message.clone()))
    }

    /// Messages from oldest to newest.
    #[must_use]
    pub fn values(&self) -> Vec<Message> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().messages.is_empty()
    }

    /// Remove every message, returning them.
    pub fn drain(&self) -> Vec<Message> {
        let mut inner = self.inner.lock();
        inner.order.clear();
        inner.messages.drain().map(|(_, message)| message).collect()
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
