use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// What a booking write is serialized on: the unit it occupies and the guest
/// who holds it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Unit(String),
    Guest(String),
}

/// Exclusive async locks addressed by key, created on first use and
/// evicted once nobody holds or waits on them.
pub struct KeyedLocks<K: Hash + Eq> {
    slots: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Hash + Eq> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Ord + Clone> KeyedLocks<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire every key in `keys`. Keys are sorted and deduplicated first so
    /// callers locking overlapping key sets cannot deadlock.
    ///
    /// Guards collect in the returned set as they are taken, so a caller that
    /// gives up halfway still releases and evicts what it touched.
    pub async fn acquire(self: &Arc<Self>, keys: impl IntoIterator<Item = K>) -> LockSet<K> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut set = LockSet {
            guards: Vec::with_capacity(keys.len()),
            keys,
            owner: self.clone(),
        };
        for i in 0..set.keys.len() {
            let slot = self.slots.entry(set.keys[i].clone()).or_default().value().clone();
            let guard = slot.lock_owned().await;
            set.guards.push(guard);
        }
        set
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Held locks. Released in reverse acquisition order on drop.
pub struct LockSet<K: Hash + Eq> {
    /// Every requested key, sorted; `guards[i]` belongs to `keys[i]`.
    keys: Vec<K>,
    guards: Vec<OwnedMutexGuard<()>>,
    owner: Arc<KeyedLocks<K>>,
}

impl<K: Hash + Eq> Drop for LockSet<K> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
        for key in self.keys.iter().rev() {
            // Only the map's own handle left: nobody holds or waits on this slot.
            self.owner
                .slots
                .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
        }
    }
}
