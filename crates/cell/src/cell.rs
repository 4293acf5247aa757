//! AtomicCell: shared state updated by compare-and-swap
//!
//! ## Design
//!
//! The slot is an `ArcSwap` over an immutable commit record: the value as an
//! `Arc<T>` plus the commit's sequence number. Writers never mutate in place.
//!
//! - `get()`: one atomic load, never blocks, never fails
//! - `update(f)`: load, compute `f(current)`, CAS; on conflict retry from the
//!   value that won
//! - `set(v)`: CAS without a transform; on conflict retry with the same value
//!
//! Successful commits are totally ordered and numbered without gaps, the
//! initial value being 0. `set` ignores the value it replaces and may
//! overwrite a concurrent `update`'s result; callers who need every
//! transform to see the previous state should use `update` only.
//!
//! ## Notifications
//!
//! After every commit (`update` and `set` alike) the sequence number and the
//! old and new values go to the cell's [`ChangeNotifier`], which delivers
//! changes in sequence order. If the values differ under the cell's
//! [`Equality`], watchers run asynchronously with this cell as the reference.
//! Watchers get `old` and `new` as arguments; reading the cell from inside a
//! watcher may already show a later value.

use crate::builder::CellBuilder;
use crate::equality::Equality;
use crate::notifier::ChangeNotifier;
use crate::watch::{WatchFn, WatchKey};
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Outcome of an update, including how contended it was.
#[derive(Debug, Clone)]
pub struct UpdateOutcome<T> {
    /// The committed value
    pub value: Arc<T>,
    /// The value it replaced
    pub previous: Arc<T>,
    /// Position of this commit in the cell's history
    pub sequence: u64,
    /// Number of times the transform ran (1 = no contention)
    pub attempts: u32,
}

impl<T> UpdateOutcome<T> {
    /// True if at least one CAS lost to another writer.
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Shared state holder updated synchronously by compare-and-swap.
///
/// Cloning yields another handle to the same cell.
pub struct AtomicCell<T> {
    inner: Arc<CellInner<T>>,
}

struct CellInner<T> {
    slot: ArcSwap<Committed<T>>,
    notifier: ChangeNotifier<AtomicCell<T>, T>,
}

/// One committed state.
struct Committed<T> {
    seq: u64,
    value: Arc<T>,
}

impl<T> Committed<T> {
    fn next(&self, value: Arc<T>) -> Arc<Self> {
        Arc::new(Committed {
            seq: self.seq + 1,
            value,
        })
    }
}

impl<T: Send + Sync + 'static> AtomicCell<T> {
    /// Create a cell using structural equality for change detection.
    pub fn new(initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(initial, Equality::structural())
    }

    /// Create a cell with a custom change predicate.
    pub fn with_equality(initial: T, equality: Equality<T>) -> Self {
        Self::from_parts(initial, ChangeNotifier::new(equality))
    }

    /// Start configuring a cell.
    pub fn builder(initial: T) -> CellBuilder<T>
    where
        T: PartialEq,
    {
        CellBuilder::new(initial)
    }

    pub(crate) fn from_parts(initial: T, notifier: ChangeNotifier<AtomicCell<T>, T>) -> Self {
        AtomicCell {
            inner: Arc::new(CellInner {
                slot: ArcSwap::from_pointee(Committed {
                    seq: 0,
                    value: Arc::new(initial),
                }),
                notifier,
            }),
        }
    }

    /// Apply a pure transform, retrying until it commits. Returns the new value.
    pub fn update<F>(&self, f: F) -> Arc<T>
    where
        F: Fn(&T) -> T,
    {
        self.update_reporting(f).value
    }

    /// Apply a pure transform with bound arguments.
    ///
    /// `args` is passed by reference to every attempt.
    pub fn update_with<A, F>(&self, f: F, args: A) -> Arc<T>
    where
        F: Fn(&T, &A) -> T,
    {
        self.update(|current| f(current, &args))
    }

    /// Apply a fallible transform.
    ///
    /// An `Err` stops the retry loop immediately and nothing is committed.
    pub fn try_update<E, F>(&self, f: F) -> Result<Arc<T>, E>
    where
        F: Fn(&T) -> Result<T, E>,
    {
        self.commit(f).map(|outcome| outcome.value)
    }

    /// Like [`try_update`](Self::try_update), also reporting the replaced
    /// value, the commit's sequence number and the number of attempts.
    pub fn try_update_reporting<E, F>(&self, f: F) -> Result<UpdateOutcome<T>, E>
    where
        F: Fn(&T) -> Result<T, E>,
    {
        self.commit(f)
    }

    /// Like [`update`](Self::update), also reporting the number of attempts.
    pub fn update_reporting<F>(&self, f: F) -> UpdateOutcome<T>
    where
        F: Fn(&T) -> T,
    {
        match self.commit(|current| Ok::<T, std::convert::Infallible>(f(current))) {
            Ok(outcome) => outcome,
            Err(never) => match never {},
        }
    }

    fn commit<E, F>(&self, f: F) -> Result<UpdateOutcome<T>, E>
    where
        F: Fn(&T) -> Result<T, E>,
    {
        let slot = &self.inner.slot;
        let mut attempts = 0u32;
        let mut current = slot.load();
        loop {
            attempts += 1;
            let value = Arc::new(f(&*current.value)?);
            let next = current.next(Arc::clone(&value));
            let sequence = next.seq;

            let prev = slot.compare_and_swap(&*current, next);
            if Arc::ptr_eq(&*prev, &*current) {
                if attempts > 1 {
                    trace!(attempts, sequence, "update committed after contention");
                }
                let previous = Arc::clone(&current.value);
                self.inner
                    .notifier
                    .notify(sequence, self, Arc::clone(&previous), Arc::clone(&value));
                return Ok(UpdateOutcome {
                    value,
                    previous,
                    sequence,
                    attempts,
                });
            }
            current = prev;
        }
    }

    /// Overwrite the value unconditionally. Returns the new value.
    ///
    /// Watchers are notified if the overwrite is a change.
    pub fn set(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let slot = &self.inner.slot;
        let mut current = slot.load();
        loop {
            let next = current.next(Arc::clone(&value));
            let sequence = next.seq;

            let prev = slot.compare_and_swap(&*current, next);
            if Arc::ptr_eq(&*prev, &*current) {
                let previous = Arc::clone(&current.value);
                self.inner.notifier.notify(sequence, self, previous, Arc::clone(&value));
                return value;
            }
            current = prev;
        }
    }

    /// Add or replace the watcher under `key`.
    ///
    /// The callback receives `(key, cell, old, new)` on every change
    /// committed after this call returns.
    pub fn watch<F>(&self, key: impl Into<WatchKey>, f: F) -> &Self
    where
        F: Fn(&WatchKey, &AtomicCell<T>, &T, &T) + Send + Sync + 'static,
    {
        let watcher: WatchFn<AtomicCell<T>, T> = Arc::new(f);
        self.inner.notifier.add(key.into(), watcher);
        self
    }

    /// Add or replace a watcher that also receives bound arguments.
    pub fn watch_with<A, F>(&self, key: impl Into<WatchKey>, args: A, f: F) -> &Self
    where
        A: Send + Sync + 'static,
        F: Fn(&WatchKey, &AtomicCell<T>, &T, &T, &A) + Send + Sync + 'static,
    {
        self.watch(key, move |k: &WatchKey, cell: &AtomicCell<T>, old: &T, new: &T| {
            f(k, cell, old, new, &args)
        })
    }
}

impl<T> AtomicCell<T> {
    /// Current value.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&self.inner.slot.load().value)
    }

    /// Sequence number of the current value; 0 until the first commit.
    pub fn sequence(&self) -> u64 {
        self.inner.slot.load().seq
    }

    /// Remove the watcher under `key`. Returns true if one was registered.
    ///
    /// No notification for a change committed after this returns will run
    /// the watcher, even if earlier notifications are still queued.
    pub fn unwatch(&self, key: &str) -> bool {
        self.inner.notifier.remove(key)
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.notifier.watcher_count()
    }

    /// True if a watcher is registered under `key`.
    pub fn is_watching(&self, key: &str) -> bool {
        self.inner.notifier.is_watching(key)
    }

    /// True when no notifications are queued or running.
    pub fn notifications_idle(&self) -> bool {
        self.inner.notifier.is_idle()
    }

    /// Number of watcher invocations that panicked.
    pub fn watcher_failures(&self) -> u64 {
        self.inner.notifier.failures()
    }

    /// Number of times the notifier's worker could not be started.
    ///
    /// Each such change stays queued until a later change starts a worker.
    pub fn notifier_spawn_failures(&self) -> u64 {
        self.inner.notifier.spawn_failures()
    }

    /// True if both handles refer to the same cell.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T> Clone for AtomicCell<T> {
    fn clone(&self) -> Self {
        AtomicCell {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicCell")
            .field("value", &*self.inner.slot.load().value)
            .field("watchers", &self.watcher_count())
            .finish()
    }
}
