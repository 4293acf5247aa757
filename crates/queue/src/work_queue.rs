//! Self-starting, self-stopping work queue
//!
//! A [`WorkQueue`] owns a [`LockFreeQueue`] and a processor function. There is
//! no resident thread: the first enqueue against an idle queue starts a
//! worker, the worker drains the queue, and it retires once the queue is
//! empty.
//!
//! ## State Machine
//!
//! ```text
//!            enqueue wins idle -> running CAS
//!   Idle  ------------------------------------>  Running
//!     ^                                             |
//!     |      worker observes empty, clears flag,    |
//!     +---- re-checks the queue and finds nothing --+
//! ```
//!
//! At most one worker exists per queue, so jobs are processed one at a time,
//! in FIFO order, exactly once each.
//!
//! ## The Retire Race
//!
//! A producer may push just as the worker decides the queue is empty. The
//! producer sees the flag still set and leaves its job; the worker then
//! clears the flag. To avoid stranding that job the worker re-checks the
//! queue *after* clearing the flag and, if anything arrived, tries to take
//! the flag back. Both sides use sequentially consistent operations on the
//! queue head and the flag, so at least one of them sees the other.

use crate::mpsc::LockFreeQueue;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::{fmt, thread};
use tessera_core::{panic_message, Error, FailurePolicy, QueueOptions, Result};
use tracing::{debug, error, trace, warn};

/// Function applied to each job, on the worker, one job at a time.
pub type Processor<J> = dyn Fn(J) -> Result<()> + Send + Sync;

/// Queue of jobs drained by an on-demand background worker.
///
/// Cloning yields another handle to the same queue. A running worker keeps
/// the queue alive until it drains, so dropping every handle never loses an
/// accepted job.
pub struct WorkQueue<J> {
    shared: Arc<Shared<J>>,
}

struct Shared<J> {
    queue: LockFreeQueue<J>,
    /// Set while a worker owns the consumer side of `queue`
    running: AtomicBool,
    /// Failure that stopped the worker under `FailurePolicy::Halt`
    halted: OnceLock<String>,
    processor: Box<Processor<J>>,
    options: QueueOptions,
    /// Workers currently inside `drain`; never more than one
    workers: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl<J: Send + 'static> WorkQueue<J> {
    /// Create an idle queue with default options.
    pub fn new<F>(processor: F) -> Self
    where
        F: Fn(J) -> Result<()> + Send + Sync + 'static,
    {
        Self::build(QueueOptions::default(), Box::new(processor))
    }

    /// Create an idle queue with default options and the given failure policy.
    pub fn with_failure_policy<F>(policy: FailurePolicy, processor: F) -> Self
    where
        F: Fn(J) -> Result<()> + Send + Sync + 'static,
    {
        let options = QueueOptions::default().with_failure_policy(policy);
        Self::build(options, Box::new(processor))
    }

    /// Create an idle queue with custom options.
    pub fn with_options<F>(options: QueueOptions, processor: F) -> Result<Self>
    where
        F: Fn(J) -> Result<()> + Send + Sync + 'static,
    {
        options.validate()?;
        Ok(Self::build(options, Box::new(processor)))
    }

    fn build(options: QueueOptions, processor: Box<Processor<J>>) -> Self {
        WorkQueue {
            shared: Arc::new(Shared {
                queue: LockFreeQueue::new(),
                running: AtomicBool::new(false),
                halted: OnceLock::new(),
                processor,
                options,
                workers: AtomicUsize::new(0),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Append a job, starting a worker if the queue is idle.
    ///
    /// Never blocks. Fails only if the queue has halted, or if a worker was
    /// needed and could not be started. In the latter case the job stays
    /// queued and the next successful enqueue picks it up.
    ///
    /// The halted check is best-effort: a job accepted while the worker is
    /// halting is abandoned without running.
    pub fn enqueue(&self, job: J) -> Result<()> {
        self.push(job)?;
        self.wake()
    }

    /// Append a job without starting a worker.
    ///
    /// The job runs once [`wake`](Self::wake) or a later `enqueue` finds the
    /// queue idle, or as soon as an already running worker reaches it.
    pub fn push(&self, job: J) -> Result<()> {
        let shared = &self.shared;
        if let Some(reason) = shared.halted.get() {
            warn!(queue = %shared.options.name, "enqueue rejected: queue halted");
            return Err(Error::Halted {
                queue: shared.options.name.clone(),
                reason: reason.clone(),
            });
        }
        shared.queue.push(job);
        Ok(())
    }

    /// Start a worker if jobs are waiting and none is running.
    pub fn wake(&self) -> Result<()> {
        let shared = &self.shared;
        if !shared.queue.is_empty()
            && !shared.running.load(Ordering::SeqCst)
            && shared
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            self.start_worker()?;
        }
        Ok(())
    }

    fn start_worker(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let task = Box::new(move || shared.drain());
        if let Err(e) = self
            .shared
            .options
            .spawner
            .spawn(&self.shared.options.name, task)
        {
            // Back to idle so a later enqueue can try again.
            self.shared.running.store(false, Ordering::SeqCst);
            error!(queue = %self.shared.options.name, error = %e, "failed to start worker");
            return Err(e);
        }
        Ok(())
    }
}

impl<J> WorkQueue<J> {
    /// Queue name from the options.
    pub fn name(&self) -> &str {
        &self.shared.options.name
    }

    /// Approximate number of jobs waiting to be processed.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// True while a worker is draining (or the queue has halted).
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// True when no worker is running and nothing is queued.
    pub fn is_idle(&self) -> bool {
        !self.is_running() && self.shared.queue.is_empty()
    }

    /// True once a failing job stopped the worker.
    pub fn is_halted(&self) -> bool {
        self.shared.halted.get().is_some()
    }

    /// The failure that halted the queue, if any.
    pub fn halt_reason(&self) -> Option<&str> {
        self.shared.halted.get().map(String::as_str)
    }

    /// Jobs the processor completed successfully.
    pub fn processed(&self) -> u64 {
        self.shared.processed.load(Ordering::Relaxed)
    }

    /// Jobs that failed (errors and panics).
    pub fn failed(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }
}

impl<J> Shared<J> {
    /// Worker body. Runs with `running` held.
    fn drain(self: Arc<Self>) {
        let name = self.options.name.as_str();
        self.enter();
        debug!(queue = name, "worker started");

        loop {
            // SAFETY: `running` is held by this worker, so no other pop can
            // run until we clear it.
            while let Some(job) = unsafe { self.queue.pop_unchecked() } {
                if !self.run(job) {
                    self.exit();
                    return;
                }
            }

            if !self.queue.is_empty() {
                // A producer swapped the head but has not linked its node yet.
                trace!(queue = name, "waiting for in-flight push");
                thread::yield_now();
                continue;
            }

            self.exit();
            self.running.store(false, Ordering::SeqCst);
            if self.queue.is_empty()
                || self
                    .running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
            {
                debug!(queue = name, processed = self.processed.load(Ordering::Relaxed), "worker retired");
                return;
            }
            // A push landed after we cleared the flag and nobody else claimed it.
            self.enter();
        }
    }

    fn enter(&self) {
        let previous = self.workers.fetch_add(1, Ordering::SeqCst);
        debug_assert_eq!(previous, 0, "two workers on queue '{}'", self.options.name);
    }

    fn exit(&self) {
        self.workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Process one job. Returns false when the worker must stop.
    fn run(&self, job: J) -> bool {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.processor)(job)));
        match (outcome, self.options.failure_policy) {
            (Ok(Ok(())), _) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                true
            }
            (Ok(Err(e)), FailurePolicy::Isolate) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(queue = %self.options.name, error = %e, "job failed, continuing");
                true
            }
            (Err(payload), FailurePolicy::Isolate) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    queue = %self.options.name,
                    panic = %panic_message(payload.as_ref()),
                    "job panicked, continuing"
                );
                true
            }
            (Ok(Err(e)), FailurePolicy::Halt) => {
                self.halt(e.to_string());
                false
            }
            (Err(payload), FailurePolicy::Halt) => {
                self.halt(Error::Panicked(panic_message(payload.as_ref())).to_string());
                self.exit();
                // The worker crashes; `running` stays set so none replaces it.
                panic::resume_unwind(payload)
            }
        }
    }

    fn halt(&self, reason: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        error!(
            queue = %self.options.name,
            reason = %reason,
            pending = self.queue.len(),
            "job failed, halting queue"
        );
        // Only one worker exists, so this is the only writer.
        let _ = self.halted.set(reason);
        self.discard();
    }

    /// Drop every job queued behind a halt without running it.
    fn discard(&self) {
        let mut dropped = 0usize;
        // SAFETY: called by the halting worker, and `running` stays set
        // after a halt, so no other consumer can ever start.
        while let Some(job) = unsafe { self.queue.pop_unchecked() } {
            drop(job);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(queue = %self.options.name, dropped, "discarded jobs queued behind failure");
        }
    }
}

impl<J> Clone for WorkQueue<J> {
    fn clone(&self) -> Self {
        WorkQueue {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<J> fmt::Debug for WorkQueue<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.shared.options.name)
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .field("halted", &self.shared.halted.get())
            .finish()
    }
}
