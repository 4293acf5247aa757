//! Queue Tests
//!
//! - LockFreeQueue ordering through the facade
//! - WorkQueue draining, retiring and restarting
//! - Custom spawners

use crate::common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tessera::{Error, FailurePolicy, LockFreeQueue, QueueOptions, Result, Spawner, Task, WorkQueue};

/// Test the basic push/pop contract
#[test]
fn test_lock_free_queue_fifo() {
    let mut q = LockFreeQueue::new();
    q.push("a");
    q.push("b");

    assert_eq!(q.pop(), Some("a"));
    assert_eq!(q.pop(), Some("b"));
    assert_eq!(q.pop(), None);
}

/// Test that many producers feeding one consumer deliver everything once
#[test]
fn test_lock_free_queue_many_producers() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 2_000;

    let q = Arc::new(LockFreeQueue::new());
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    q.push((p, i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let mut q = Arc::try_unwrap(q).expect("producers finished");
    let mut next = vec![0usize; PRODUCERS];
    while let Some((p, i)) = q.pop() {
        assert_eq!(i, next[p], "producer {} out of order", p);
        next[p] += 1;
    }
    assert!(next.iter().all(|n| *n == PER_PRODUCER));
}

/// Test that a work queue restarts after retiring
#[test]
fn test_work_queue_restarts_after_idle() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let queue = WorkQueue::new(move |job: u32| {
        sink.lock().push(job);
        Ok(())
    });

    for round in 0..5u32 {
        queue.enqueue(round).unwrap();
        eventually("queue to retire", SETTLE, || queue.is_idle());
    }

    assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(queue.processed(), 5);
}

/// Test that jobs never overlap even under heavy concurrent enqueueing
#[test]
fn test_work_queue_serializes_jobs() {
    init_tracing();
    let active = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let queue = {
        let (active, done) = (Arc::clone(&active), Arc::clone(&done));
        WorkQueue::new(move |_: ()| {
            assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0, "overlapping jobs");
            thread::yield_now();
            active.fetch_sub(1, Ordering::SeqCst);
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..500 {
                    queue.enqueue(()).unwrap();
                }
            });
        }
    });

    eventually("all jobs", SETTLE, || done.load(Ordering::SeqCst) == 4_000);
    assert!(!queue.is_halted());
}

/// Spawner that runs each worker on a fresh thread and counts starts.
#[derive(Debug, Default)]
struct CountingSpawner {
    starts: AtomicUsize,
}

impl Spawner for CountingSpawner {
    fn spawn(&self, name: &str, task: Task) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        thread::Builder::new()
            .name(format!("counted-{}", name))
            .spawn(task)
            .map(|_| ())
            .map_err(Error::from)
    }
}

/// Test that a custom spawner starts one worker per busy period
#[test]
fn test_custom_spawner() {
    init_tracing();
    let spawner = Arc::new(CountingSpawner::default());
    let options = QueueOptions::named("jobs").with_spawner(spawner.clone());
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = Mutex::new(tx);
    let queue = WorkQueue::with_options(options, move |job: u32| {
        let worker = thread::current().name().map(str::to_string);
        tx.lock().send((job, worker)).map_err(Error::action)
    })
    .unwrap();

    queue.enqueue(1).unwrap();
    let (job, worker) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(job, 1);
    assert_eq!(worker.as_deref(), Some("counted-jobs"));
    eventually("queue to retire", SETTLE, || queue.is_idle());

    queue.enqueue(2).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap().0, 2);
    eventually("queue to retire", SETTLE, || queue.is_idle());
    assert_eq!(spawner.starts.load(Ordering::SeqCst), 2);
}

/// Test the two failure policies side by side
#[test]
fn test_failure_policies() {
    init_tracing();
    let fallible = |job: i32| if job < 0 { Err(Error::action("negative job")) } else { Ok(()) };

    let halting = WorkQueue::with_failure_policy(FailurePolicy::Halt, fallible);
    let isolating = WorkQueue::with_failure_policy(FailurePolicy::Isolate, fallible);
    for job in [1, -1, 2] {
        let _ = halting.enqueue(job);
        isolating.enqueue(job).unwrap();
    }

    eventually("halt", SETTLE, || halting.is_halted());
    eventually("isolating queue", SETTLE, || isolating.is_idle());

    assert_eq!(halting.halt_reason(), Some("action failed: negative job"));
    assert!(matches!(halting.enqueue(3), Err(Error::Halted { .. })));
    assert_eq!(isolating.processed(), 2);
    assert_eq!(isolating.failed(), 1);
}
