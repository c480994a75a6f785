//! Reference-counted storage for users and private channels.
//!
//! An entry is *retained* while another cached entity (a member or a
//! message) refers to it and is never evicted in that state. Entries with
//! no references are *idle*: they stay readable but wait in a bounded queue
//! and are evicted oldest-idle-first once the queue exceeds its capacity.

use crate::id::Id;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

struct Slot<V> {
    value: V,
    refs: usize,
    /// Bumped every time the slot becomes idle. Queue entries carrying an
    /// older stamp are stale.
    stamp: u64,
}

struct Inner<M, V> {
    slots: HashMap<Id<M>, Slot<V>>,
    idle: VecDeque<(Id<M>, u64)>,
    idle_len: usize,
    next_stamp: u64,
}

impl<M, V> Inner<M, V> {
    fn mark_idle(&mut self, id: Id<M>) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.stamp = stamp;
            self.idle.push_back((id, stamp));
            self.idle_len += 1;
        }
    }

    fn is_live(&self, id: Id<M>, stamp: u64) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|slot| slot.refs == 0 && slot.stamp == stamp)
    }

    fn evict(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.idle_len > capacity {
            let Some((id, stamp)) = self.idle.pop_front() else {
                break;
            };
            if self.is_live(id, stamp) {
                self.slots.remove(&id);
                self.idle_len -= 1;
                evicted += 1;
            }
        }

        // Stale stamps pile up when entries flip between idle and retained.
        if self.idle.len() > 2 * capacity.max(16) {
            let idle = std::mem::take(&mut self.idle);
            self.idle = idle
                .into_iter()
                .filter(|(id, stamp)| self.is_live(*id, *stamp))
                .collect();
        }
        evicted
    }
}

/// Two-tier store: strong while referenced, bounded while idle.
pub struct RetainedStore<M, V> {
    inner: Mutex<Inner<M, V>>,
    capacity: usize,
}

impl<M, V: Clone> RetainedStore<M, V> {
    /// `capacity` bounds the number of idle entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                idle: VecDeque::new(),
                idle_len: 0,
                next_stamp: 0,
            }),
            capacity,
        }
    }

    #[must_use]
    pub fn get(&self, id: Id<M>) -> Option<V> {
        self.inner.lock().slots.get(&id).map(|slot| slot.value.clone())
    }

    #[must_use]
    pub fn contains(&self, id: Id<M>) -> bool {
        self.inner.lock().slots.contains_key(&id)
    }

    /// Insert or overwrite an entry without touching its reference count.
    ///
    /// A new entry starts idle.
    pub fn insert(&self, id: Id<M>, value: V) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(&id) {
            slot.value = value;
            return;
        }
        inner.slots.insert(
            id,
            Slot {
                value,
                refs: 0,
                stamp: 0,
            },
        );
        inner.mark_idle(id);
        inner.evict(self.capacity);
    }

    /// Insert or overwrite an entry and take a reference to it.
    pub fn insert_retained(&self, id: Id<M>, value: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.slots.get_mut(&id) {
            Some(slot) => {
                slot.value = value;
                slot.refs += 1;
                if slot.refs == 1 {
                    inner.idle_len -= 1;
                }
            }
            None => {
                inner.slots.insert(
                    id,
                    Slot {
                        value,
                        refs: 1,
                        stamp: 0,
                    },
                );
            }
        }
    }

    /// Take a reference to an existing entry. Returns `false` if unknown.
    pub fn retain(&self, id: Id<M>) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(slot) = inner.slots.get_mut(&id) else {
            return false;
        };
        slot.refs += 1;
        if slot.refs == 1 {
            inner.idle_len -= 1;
        }
        true
    }

    /// Drop one reference. The entry becomes idle at zero.
    pub fn release(&self, id: Id<M>) {
        let mut inner = self.inner.lock();
        let Some(slot) = inner.slots.get_mut(&id) else {
            return;
        };
        if slot.refs == 0 {
            return;
        }
        slot.refs -= 1;
        if slot.refs == 0 {
            inner.mark_idle(id);
            inner.evict(self.capacity);
        }
    }

    /// Mutate an entry in place, returning `(before, after)`.
    pub fn update<F>(&self, id: Id<M>, f: F) -> Option<(V, V)>
    where
        F: FnOnce(&mut V),
    {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(&id)?;
        let before = slot.value.clone();
        f(&mut slot.value);
        Some((before, slot.value.clone()))
    }

    /// Remove an entry regardless of its references.
    pub fn remove(&self, id: Id<M>) -> Option<V> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.remove(&id)?;
        if slot.refs == 0 {
            inner.idle_len -= 1;
        }
        Some(slot.value)
    }

    #[must_use]
    pub fn is_retained(&self, id: Id<M>) -> bool {
        self.inner
            .lock()
            .slots
            .get(&id)
            .is_some_and(|slot| slot.refs > 0)
    }

    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.inner
            .lock()
            .slots
            .values()
            .map(|slot| slot.value.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    /// Number of entries nothing refers to.
    #[must_use]
    pub fn idle_len(&self) -> usize {
        self.inner.lock().idle_len
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.slots.clear();
        inner.idle.clear();
        inner.idle_len = 0;
    }
}

impl<M, V> std::fmt::Debug for RetainedStore<M, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RetainedStore")
            .field("len", &inner.slots.len())
            .field("idle", &inner.idle_len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
