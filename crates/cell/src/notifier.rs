//! Change notification
//!
//! Each cell owns one [`ChangeNotifier`]. A committed change turns into one
//! job on the notifier's own work queue; the job carries the old and new
//! values, the reference handed to watchers, and the watcher set as it was
//! when the change was committed.
//!
//! ## Commit Order
//!
//! Every commit carries the sequence number it was given inside its CAS, and
//! every sequence number must be passed to [`ChangeNotifier::notify`] exactly
//! once, even when nothing is to be delivered. Writers reach `notify` in
//! whatever order the scheduler allows, so a change that arrives ahead of an
//! earlier one is parked until the gap fills. Jobs enter the queue strictly
//! by sequence number.
//!
//! ## Dispatch
//!
//! - One watcher: called inline on the notifier's worker
//! - Several: each on its own scoped thread, all joined before the job ends
//!
//! The queue runs one job at a time, so the watchers of one batch run in
//! parallel while batches stay in commit order.
//!
//! ## Failure Isolation
//!
//! A panicking watcher is caught, logged and counted. Its siblings in the
//! same batch and every later batch still run.

use crate::equality::Equality;
use crate::watch::{WatchFn, WatchKey, WatcherMap, WatcherRegistry};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tessera_core::{panic_message, FailurePolicy, QueueOptions, Result};
use tessera_queue::WorkQueue;
use tracing::{error, warn};

/// Sequence number of the first commit after a cell's initial value.
pub const FIRST_SEQUENCE: u64 = 1;

/// One pending notification.
struct NotifyJob<R, T> {
    reference: R,
    old: Arc<T>,
    new: Arc<T>,
    watchers: Arc<WatcherMap<R, T>>,
}

/// Changes that arrived ahead of an earlier commit.
///
/// `None` marks a commit with nothing to deliver.
struct Parked<J> {
    next: u64,
    jobs: BTreeMap<u64, Option<J>>,
}

/// Per-cell watcher registry plus the queue that runs watchers.
pub struct ChangeNotifier<R, T> {
    registry: WatcherRegistry<R, T>,
    equality: Equality<T>,
    queue: WorkQueue<NotifyJob<R, T>>,
    parked: Mutex<Parked<NotifyJob<R, T>>>,
    failures: Arc<AtomicU64>,
    spawn_failures: AtomicU64,
}

impl<R, T> ChangeNotifier<R, T>
where
    R: Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Create a notifier with default queue options.
    pub fn new(equality: Equality<T>) -> Self {
        let failures = Arc::new(AtomicU64::new(0));
        let queue = {
            let failures = Arc::clone(&failures);
            WorkQueue::with_failure_policy(FailurePolicy::Isolate, move |job: NotifyJob<R, T>| {
                dispatch(job, &failures)
            })
        };
        Self::assemble(equality, queue, failures)
    }

    /// Create a notifier whose queue uses `options`.
    ///
    /// The failure policy is forced to `Isolate`: watcher failures must never
    /// stop later notifications.
    pub fn with_options(equality: Equality<T>, options: QueueOptions) -> Result<Self> {
        let failures = Arc::new(AtomicU64::new(0));
        let options = options.with_failure_policy(FailurePolicy::Isolate);
        let queue = {
            let failures = Arc::clone(&failures);
            WorkQueue::with_options(options, move |job: NotifyJob<R, T>| dispatch(job, &failures))?
        };
        Ok(Self::assemble(equality, queue, failures))
    }

    fn assemble(equality: Equality<T>, queue: WorkQueue<NotifyJob<R, T>>, failures: Arc<AtomicU64>) -> Self {
        ChangeNotifier {
            registry: WatcherRegistry::new(),
            equality,
            queue,
            parked: Mutex::new(Parked {
                next: FIRST_SEQUENCE,
                jobs: BTreeMap::new(),
            }),
            failures,
            spawn_failures: AtomicU64::new(0),
        }
    }

    /// Hand over commit `seq`, which moved the value from `old` to `new`.
    ///
    /// Sequence numbers start at [`FIRST_SEQUENCE`] and must be passed
    /// without gaps; a missing one holds back every later change.
    ///
    /// Nothing is delivered if no watchers are registered or the values are
    /// equal. `reference` is only cloned when a job is actually queued.
    ///
    /// If the queue's worker cannot be started the change stays queued, is
    /// counted in [`spawn_failures`](Self::spawn_failures), and is delivered
    /// once a later change starts a worker.
    pub fn notify(&self, seq: u64, reference: &R, old: Arc<T>, new: Arc<T>) {
        let watchers = self.registry.snapshot();
        let job = if watchers.is_empty() {
            None
        } else {
            let unchanged = panic::catch_unwind(AssertUnwindSafe(|| self.equality.eq(&old, &new)));
            match unchanged {
                Ok(true) => None,
                Ok(false) => Some(NotifyJob {
                    reference: reference.clone(),
                    old,
                    new,
                    watchers,
                }),
                Err(payload) => {
                    // The commit stands; release its slot before unwinding.
                    self.hand_off(seq, None);
                    panic::resume_unwind(payload)
                }
            }
        };
        self.hand_off(seq, job);
    }

    /// Queue every change that is now in order, then make sure a worker runs.
    fn hand_off(&self, seq: u64, job: Option<NotifyJob<R, T>>) {
        let mut pushed = false;
        {
            let mut parked = self.parked.lock();
            if seq < parked.next {
                warn!(queue = %self.queue.name(), seq, next = parked.next, "change handed off twice, ignored");
                return;
            }
            parked.jobs.insert(seq, job);
            loop {
                let next = parked.next;
                let entry = match parked.jobs.remove(&next) {
                    Some(entry) => entry,
                    None => break,
                };
                parked.next = next + 1;
                if let Some(job) = entry {
                    // Isolating queues never halt.
                    pushed |= self.queue.push(job).is_ok();
                }
            }
        }

        if pushed {
            if let Err(e) = self.queue.wake() {
                self.spawn_failures.fetch_add(1, Ordering::Relaxed);
                warn!(queue = %self.queue.name(), error = %e, "notification delayed");
            }
        }
    }

    /// Add or replace a watcher. Returns true if one was replaced.
    pub fn add(&self, key: WatchKey, watcher: WatchFn<R, T>) -> bool {
        self.registry.insert(key, watcher)
    }
}

impl<R, T> ChangeNotifier<R, T> {
    /// Remove a watcher. Returns true if one was registered under `key`.
    pub fn remove(&self, key: &str) -> bool {
        self.registry.remove(key)
    }

    /// The equality predicate deciding what counts as a change.
    pub fn equality(&self) -> &Equality<T> {
        &self.equality
    }

    /// Number of registered watchers.
    pub fn watcher_count(&self) -> usize {
        self.registry.len()
    }

    /// True if `key` is registered.
    pub fn is_watching(&self, key: &str) -> bool {
        self.registry.contains(key)
    }

    /// Notifications queued or parked but not yet delivered.
    pub fn pending(&self) -> usize {
        self.parked_jobs() + self.queue.pending()
    }

    /// True when every handed-off notification has been delivered.
    pub fn is_idle(&self) -> bool {
        self.parked.lock().jobs.is_empty() && self.queue.is_idle()
    }

    /// Number of watcher invocations that panicked.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Number of times a worker was needed and could not be started.
    pub fn spawn_failures(&self) -> u64 {
        self.spawn_failures.load(Ordering::Relaxed)
    }

    fn parked_jobs(&self) -> usize {
        self.parked.lock().jobs.values().filter(|job| job.is_some()).count()
    }
}

fn dispatch<R, T>(job: NotifyJob<R, T>, failures: &AtomicU64) -> Result<()>
where
    R: Sync,
    T: Sync,
{
    let NotifyJob {
        reference,
        old,
        new,
        watchers,
    } = job;

    if watchers.len() == 1 {
        for (key, watcher) in watchers.iter() {
            invoke(key, watcher, &reference, &old, &new, failures);
        }
        return Ok(());
    }

    thread::scope(|s| {
        for (key, watcher) in watchers.iter() {
            let (reference, old, new) = (&reference, &*old, &*new);
            let spawned = thread::Builder::new()
                .name("tessera-watcher".to_string())
                .spawn_scoped(s, move || invoke(key, watcher, reference, old, new, failures));
            if let Err(e) = spawned {
                warn!(key = %key, error = %e, "could not spawn watcher thread, running inline");
                invoke(key, watcher, reference, old, new, failures);
            }
        }
    });
    Ok(())
}

fn invoke<R, T>(
    key: &WatchKey,
    watcher: &WatchFn<R, T>,
    reference: &R,
    old: &T,
    new: &T,
    failures: &AtomicU64,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| watcher(key, reference, old, new)));
    if let Err(payload) = outcome {
        failures.fetch_add(1, Ordering::Relaxed);
        error!(key = %key, panic = %panic_message(payload.as_ref()), "watcher panicked");
    }
}

impl<R, T> fmt::Debug for ChangeNotifier<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("registry", &self.registry)
            .field("queue", &self.queue)
            .field("parked", &self.parked_jobs())
            .field("failures", &self.failures())
            .field("spawn_failures", &self.spawn_failures())
            .finish()
    }
}
