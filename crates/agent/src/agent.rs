//! Agent: asynchronous, serialized updates to a state cell
//!
//! ## Design
//!
//! ```text
//!   send(f) ──push──> WorkQueue<Queued<T>> ──worker──> cell.try_update(f)
//!                                                          │
//!                        watchers <──agent's notifier──────┘
//! ```
//!
//! The worker is the only writer of the cell, so the CAS inside `try_update`
//! never contends and each action runs exactly once. Reads go straight to
//! the cell and never wait for the queue.
//!
//! ## Lifetime
//!
//! Every queued action and every queued notification holds a strong handle
//! to its agent. Dropping the last user handle therefore never cuts work
//! short: the agent lives until its queued actions are applied and their
//! watchers have run, then it is freed. Watchers themselves are not handles.

use crate::builder::AgentBuilder;
use std::fmt;
use std::sync::Arc;
use tessera_cell::{AtomicCell, ChangeNotifier, Equality, WatchFn, WatchKey};
use tessera_core::{Error, FailurePolicy, QueueOptions, Result};
use tessera_queue::WorkQueue;
use tracing::trace;

/// An action queued on an agent: computes the next state from the current one.
pub type Action<T> = Box<dyn Fn(&T) -> Result<T> + Send>;

/// An action together with the agent it applies to.
struct Queued<T> {
    agent: Agent<T>,
    action: Action<T>,
}

/// Shared state updated asynchronously, one action at a time, in send order.
///
/// Cloning yields another handle to the same agent.
pub struct Agent<T> {
    inner: Arc<AgentInner<T>>,
}

struct AgentInner<T> {
    cell: AtomicCell<T>,
    queue: WorkQueue<Queued<T>>,
    notifier: ChangeNotifier<Agent<T>, T>,
}

impl<T: Send + Sync + 'static> Agent<T> {
    /// Create an agent using structural equality for change detection.
    pub fn new(initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(initial, Equality::structural())
    }

    /// Create an agent with a custom change predicate.
    pub fn with_equality(initial: T, equality: Equality<T>) -> Self {
        let cell = AtomicCell::with_equality(initial, equality.clone());
        let queue = WorkQueue::with_failure_policy(FailurePolicy::Halt, Self::apply);
        Agent {
            inner: Arc::new(AgentInner {
                cell,
                queue,
                notifier: ChangeNotifier::new(equality),
            }),
        }
    }

    /// Start configuring an agent.
    pub fn builder(initial: T) -> AgentBuilder<T>
    where
        T: PartialEq,
    {
        AgentBuilder::new(initial)
    }

    pub(crate) fn from_parts(
        cell: AtomicCell<T>,
        options: QueueOptions,
        notifier: ChangeNotifier<Agent<T>, T>,
    ) -> Result<Self> {
        let queue = WorkQueue::with_options(options, Self::apply)?;
        Ok(Agent {
            inner: Arc::new(AgentInner { cell, queue, notifier }),
        })
    }

    /// Worker side: apply one action and hand the change to the watchers.
    fn apply(queued: Queued<T>) -> Result<()> {
        let Queued { agent, action } = queued;
        let outcome = agent.inner.cell.try_update_reporting(|current| action(current))?;
        agent
            .inner
            .notifier
            .notify(outcome.sequence, &agent, outcome.previous, outcome.value);
        Ok(())
    }

    /// Queue a transform. Returns without waiting for it to apply.
    ///
    /// # Errors
    ///
    /// `Error::Halted` if an earlier action failed. `Error::Spawn` if the
    /// worker could not be started; the action stays queued.
    pub fn send<F>(&self, f: F) -> Result<()>
    where
        F: Fn(&T) -> T + Send + 'static,
    {
        self.enqueue(Box::new(move |current: &T| Ok(f(current))))
    }

    /// Queue a transform with bound arguments.
    pub fn send_with<A, F>(&self, f: F, args: A) -> Result<()>
    where
        A: Send + 'static,
        F: Fn(&T, &A) -> T + Send + 'static,
    {
        self.enqueue(Box::new(move |current: &T| Ok(f(current, &args))))
    }

    /// Queue a fallible transform.
    ///
    /// If it returns `Err` when applied, the agent halts with
    /// `Error::Action` as the reason.
    pub fn try_send<E, F>(&self, f: F) -> Result<()>
    where
        E: fmt::Display,
        F: Fn(&T) -> std::result::Result<T, E> + Send + 'static,
    {
        self.enqueue(Box::new(move |current: &T| f(current).map_err(Error::action)))
    }

    fn enqueue(&self, action: Action<T>) -> Result<()> {
        trace!(agent = %self.name(), pending = self.pending(), "action queued");
        self.inner.queue.enqueue(Queued {
            agent: self.clone(),
            action,
        })
    }

    /// Add or replace the watcher under `key`.
    ///
    /// The callback receives `(key, agent, old, new)` on every change applied
    /// after this call returns, including changes from actions still queued
    /// when the last handle was dropped.
    pub fn watch<F>(&self, key: impl Into<WatchKey>, f: F) -> &Self
    where
        F: Fn(&WatchKey, &Agent<T>, &T, &T) + Send + Sync + 'static,
    {
        let watcher: WatchFn<Agent<T>, T> = Arc::new(f);
        self.inner.notifier.add(key.into(), watcher);
        self
    }

    /// Add or replace a watcher that also receives bound arguments.
    pub fn watch_with<A, F>(&self, key: impl Into<WatchKey>, args: A, f: F) -> &Self
    where
        A: Send + Sync + 'static,
        F: Fn(&WatchKey, &Agent<T>, &T, &T, &A) + Send + Sync + 'static,
    {
        self.watch(key, move |k: &WatchKey, agent: &Agent<T>, old: &T, new: &T| {
            f(k, agent, old, new, &args)
        })
    }
}

impl<T> Agent<T> {
    /// Current state.
    pub fn get(&self) -> Arc<T> {
        self.inner.cell.get()
    }

    /// Remove the watcher under `key`. Returns true if one was registered.
    pub fn unwatch(&self, key: &str) -> bool {
        self.inner.notifier.remove(key)
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.inner.notifier.watcher_count()
    }

    /// Number of watcher invocations that panicked.
    pub fn watcher_failures(&self) -> u64 {
        self.inner.notifier.failures()
    }

    /// Why the agent halted, if it has.
    pub fn error(&self) -> Option<&str> {
        self.inner.queue.halt_reason()
    }

    /// True once an action failed.
    pub fn is_halted(&self) -> bool {
        self.inner.queue.is_halted()
    }

    /// Approximate number of actions not yet applied.
    pub fn pending(&self) -> usize {
        self.inner.queue.pending()
    }

    /// True when no action is queued or running and every notification has
    /// been delivered. Never true for a halted agent.
    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_idle() && self.inner.notifier.is_idle()
    }

    /// Worker name.
    pub fn name(&self) -> &str {
        self.inner.queue.name()
    }

    /// True if both handles refer to the same agent.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T> Clone for Agent<T> {
    fn clone(&self) -> Self {
        Agent {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Agent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("state", &*self.get())
            .field("queue", &self.inner.queue)
            .finish()
    }
}
