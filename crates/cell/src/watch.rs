//! Watcher registry
//!
//! Watchers live in an immutable map published through an `ArcSwap`. Readers
//! take a snapshot with a single atomic load; writers copy the map, apply
//! their change and publish it with compare-and-swap, retrying from the
//! latest snapshot if another writer got there first. No lock is taken, and
//! concurrent add/remove calls never lose an update.

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Key identifying a watcher on one cell.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(Arc<str>);

impl WatchKey {
    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WatchKey {
    fn from(key: &str) -> Self {
        WatchKey(Arc::from(key))
    }
}

impl From<String> for WatchKey {
    fn from(key: String) -> Self {
        WatchKey(Arc::from(key))
    }
}

impl Borrow<str> for WatchKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Watcher callback: `(key, reference, old, new)`.
///
/// `R` is whatever the owner hands out as "the thing that changed": the
/// cell itself for cells, the agent for agents.
pub type WatchFn<R, T> = Arc<dyn Fn(&WatchKey, &R, &T, &T) + Send + Sync>;

/// Immutable watcher set, as captured by a notification.
pub type WatcherMap<R, T> = FxHashMap<WatchKey, WatchFn<R, T>>;

/// Lock-free registry of keyed watchers.
pub struct WatcherRegistry<R, T> {
    watchers: ArcSwap<WatcherMap<R, T>>,
}

impl<R, T> WatcherRegistry<R, T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        WatcherRegistry {
            watchers: ArcSwap::from_pointee(FxHashMap::default()),
        }
    }

    /// Add or replace the watcher under `key`.
    ///
    /// Returns true if a previous watcher was replaced.
    pub fn insert(&self, key: WatchKey, watcher: WatchFn<R, T>) -> bool {
        let mut current = self.watchers.load();
        loop {
            let mut next = WatcherMap::clone(&current);
            let replaced = next.insert(key.clone(), Arc::clone(&watcher)).is_some();

            let prev = self.watchers.compare_and_swap(&*current, Arc::new(next));
            if Arc::ptr_eq(&*prev, &*current) {
                return replaced;
            }
            current = prev;
        }
    }

    /// Remove the watcher under `key`.
    ///
    /// Returns true if a watcher was removed. Notifications captured before
    /// this call may still run it; none captured afterwards will.
    pub fn remove(&self, key: &str) -> bool {
        let mut current = self.watchers.load();
        loop {
            if !current.contains_key(key) {
                return false;
            }
            let mut next = WatcherMap::clone(&current);
            next.remove(key);

            let prev = self.watchers.compare_and_swap(&*current, Arc::new(next));
            if Arc::ptr_eq(&*prev, &*current) {
                return true;
            }
            current = prev;
        }
    }

    /// Current watcher set.
    pub fn snapshot(&self) -> Arc<WatcherMap<R, T>> {
        self.watchers.load_full()
    }

    /// True if `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.watchers.load().contains_key(key)
    }

    /// Number of registered watchers.
    pub fn len(&self) -> usize {
        self.watchers.load().len()
    }

    /// True when no watchers are registered.
    pub fn is_empty(&self) -> bool {
        self.watchers.load().is_empty()
    }
}

impl<R, T> Default for WatcherRegistry<R, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, T> fmt::Debug for WatcherRegistry<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.watchers.load();
        let mut keys: Vec<_> = snapshot.keys().collect();
        keys.sort();
        f.debug_struct("WatcherRegistry").field("keys", &keys).finish()
    }
}
