//! Keyed entity storage.

use crate::id::Id;
use dashmap::DashMap;

/// A concurrent map of entities keyed by typed id.
///
/// Lookups hand out clones. Updates mutate the stored value in place, so the
/// key never changes once inserted.
pub struct EntityMap<M, V> {
    entries: DashMap<Id<M>, V>,
}

impl<M, V: Clone> EntityMap<M, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, id: Id<M>) -> Option<V> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, id: Id<M>) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert or replace. Returns the previous value.
    pub fn insert(&self, id: Id<M>, value: V) -> Option<V> {
        self.entries.insert(id, value)
    }

    pub fn remove(&self, id: Id<M>) -> Option<V> {
        self.entries.remove(&id).map(|(_, value)| value)
    }

    /// Mutate an entry in place.
    ///
    /// Returns `(before, after)` snapshots, or `None` if the id is unknown.
    pub fn update<F>(&self, id: Id<M>, f: F) -> Option<(V, V)>
    where
        F: FnOnce(&mut V),
    {
        let mut entry = self.entries.get_mut(&id)?;
        let before = entry.value().clone();
        f(entry.value_mut());
        Some((before, entry.value().clone()))
    }

    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<Id<M>> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, returning them.
    pub fn drain(&self) -> Vec<V> {
        let ids = self.ids();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl<M, V: Clone> Default for EntityMap<M, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M, V> std::fmt::Debug for EntityMap<M, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMap")
            .field("len", &self.entries.len())
            .finish()
    }
}
