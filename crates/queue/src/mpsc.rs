//! Multi-producer, single-consumer lock-free queue
//!
//! Based on Dmitry Vyukov's non-intrusive MPSC node-based queue.
//!
//! ## Layout
//!
//! ```text
//!  tail (consumer)                                head (producers)
//!     |                                              |
//!     v                                              v
//!  [stub] --next--> [a] --next--> [b] --next--> [c] --next--> null
//! ```
//!
//! The node `tail` points at is always a sentinel whose payload has already
//! been taken. Popping moves `tail` one step forward, takes the payload out
//! of the new sentinel and frees the old one.
//!
//! ## Push is two steps
//!
//! 1. swap `head` to the new node (this is the linearization point)
//! 2. store the new node into the previous head's `next`
//!
//! Between the two steps the node is in the queue but unreachable from
//! `tail`. `pop` treats a null `next` as "empty right now"; the push becomes
//! visible to a later pop. [`LockFreeQueue::is_empty`] compares `head` and
//! `tail` instead, so it also counts pushes caught between the two steps.
//!
//! ## Single consumer
//!
//! Producers never block and never fail. Popping is only sound from one
//! thread at a time: [`LockFreeQueue::pop`] takes `&mut self` to prove it,
//! and [`LockFreeQueue::pop_unchecked`] is the `unsafe` escape hatch for
//! consumers that serialize themselves some other way (the work queue's
//! running flag).

use crate::sync::{AtomicPtr, AtomicUsize, Ordering};
use std::fmt;
use std::ptr;

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: Option<T>,
}

impl<T> Node<T> {
    fn alloc(value: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

/// Unbounded lock-free MPSC queue.
pub struct LockFreeQueue<T> {
    /// Most recently pushed node. Swapped by producers.
    head: AtomicPtr<Node<T>>,
    /// Current sentinel. Written only by the consumer; atomic so that
    /// `is_empty` can compare it from any thread.
    tail: AtomicPtr<Node<T>>,
    /// Pushes started minus pops completed
    len: AtomicUsize,
}

// SAFETY: values move between threads through the queue, which needs
// `T: Send`. No `&T` is ever shared, so `T: Sync` is not required.
unsafe impl<T: Send> Send for LockFreeQueue<T> {}
unsafe impl<T: Send> Sync for LockFreeQueue<T> {}

impl<T> LockFreeQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        let stub = Node::alloc(None);
        LockFreeQueue {
            head: AtomicPtr::new(stub),
            tail: AtomicPtr::new(stub),
            len: AtomicUsize::new(0),
        }
    }

    /// Push a value. Safe to call from any number of threads at once.
    pub fn push(&self, value: T) {
        let node = Node::alloc(Some(value));
        // Counted before the node becomes reachable so `len` never underflows.
        self.len.fetch_add(1, Ordering::Relaxed);
        let prev = self.head.swap(node, Ordering::SeqCst);
        // SAFETY: `prev` cannot have been freed. The consumer only frees a
        // sentinel after following its `next`, and `prev.next` is null until
        // the store below.
        unsafe { (*prev).next.store(node, Ordering::Release) };
    }

    /// Pop the oldest value, or `None` if nothing is visible yet.
    pub fn pop(&mut self) -> Option<T> {
        // SAFETY: `&mut self` rules out any concurrent consumer.
        unsafe { self.pop_unchecked() }
    }

    /// Pop through a shared reference.
    ///
    /// # Safety
    ///
    /// No other call to `pop_unchecked` may run concurrently on the same
    /// queue. Concurrent `push` calls are fine.
    pub unsafe fn pop_unchecked(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Acquire);
        // SAFETY: `tail` is the live sentinel, owned by the consumer (us).
        let next = unsafe { (*tail).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        self.tail.store(next, Ordering::Release);
        // SAFETY: the Acquire load of `next` synchronizes with the producer's
        // Release link, so the payload write is visible. Producers never
        // touch `value` after linking. `next` is now the sentinel; taking
        // its payload leaves nothing reachable behind.
        let value = unsafe { (*next).value.take() };
        // SAFETY: the old sentinel is unreachable: `tail` moved past it and
        // the producer that linked it is done with it.
        drop(unsafe { Box::from_raw(tail) });
        self.len.fetch_sub(1, Ordering::Relaxed);
        value
    }

    /// True when every started push has been popped.
    ///
    /// Unlike a `None` from `pop`, this is false while a push is between its
    /// two steps. Only pointer values are compared, so it may be called from
    /// any thread.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::SeqCst) == self.tail.load(Ordering::SeqCst)
    }

    /// Approximate number of queued values.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T> Default for LockFreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockFreeQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        let stub = self.tail.load(Ordering::Relaxed);
        // SAFETY: no producers remain (`&mut self`) and the queue is empty, so
        // the final sentinel is the only node left.
        drop(unsafe { Box::from_raw(stub) });
    }
}

impl<T> fmt::Debug for LockFreeQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFreeQueue")
            .field("len", &self.len())
            .finish()
    }
}
