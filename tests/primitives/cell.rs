//! AtomicCell Tests
//!
//! - Synchronous updates and reads
//! - Contention between writers
//! - Watcher delivery, ordering and removal

use crate::common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tessera::prelude::*;

/// Test that 100 concurrent increments by 0..99 sum to 4950
#[test]
fn test_concurrent_updates_fold() {
    init_tracing();
    let cell = Arc::new(AtomicCell::new(0u64));

    const NUM_WRITERS: u64 = 100;
    let barrier = Arc::new(Barrier::new(NUM_WRITERS as usize));
    let handles: Vec<_> = (0..NUM_WRITERS)
        .map(|i| {
            let cell = Arc::clone(&cell);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cell.update(|n| n + i);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*cell.get(), 4950);
}

/// Test that a reader never sees a value nobody committed
#[test]
fn test_reads_see_only_committed_values() {
    init_tracing();
    // Every committed vector is [k, k, ..., k].
    let cell = Arc::new(AtomicCell::new(vec![0u32; 16]));

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for _ in 0..1_000 {
                    cell.update(|v| vec![v[0] + 1; 16]);
                }
            })
        })
        .collect();

    let reader = {
        let cell = Arc::clone(&cell);
        thread::spawn(move || {
            for _ in 0..5_000 {
                let v = cell.get();
                assert!(v.iter().all(|x| *x == v[0]), "torn read: {:?}", v);
            }
        })
    };

    for h in writers {
        h.join().unwrap();
    }
    reader.join().unwrap();
    assert_eq!(cell.get()[0], 4_000);
}

/// Test that contention shows up in the attempt count but not in the result
#[test]
fn test_update_reporting_under_contention() {
    init_tracing();
    let cell = AtomicCell::new(0u64);
    let total_attempts = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..500 {
                    let outcome = cell.update_reporting(|n| n + 1);
                    assert!(outcome.attempts >= 1);
                    total_attempts.fetch_add(outcome.attempts as usize, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(*cell.get(), 4_000);
    assert!(total_attempts.load(Ordering::Relaxed) >= 4_000);
}

/// Test that watchers fire once per change and never for a no-op set
#[test]
fn test_watchers_fire_once_per_change() {
    init_tracing();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let cell = AtomicCell::new("idle".to_string());

    let sink = Arc::clone(&changes);
    cell.watch("status", move |_, _, old, new| {
        sink.lock().push(format!("{} -> {}", old, new));
    });

    cell.set("idle".to_string());
    cell.set("busy".to_string());
    cell.set("busy".to_string());
    cell.update(|_| "idle".to_string());
    eventually("notifications", SETTLE, || cell.notifications_idle());

    assert_eq!(
        *changes.lock(),
        vec!["idle -> busy".to_string(), "busy -> idle".to_string()]
    );
}

/// Test that every watcher sees every change, in commit order
#[test]
fn test_many_watchers_see_batches_in_order() {
    init_tracing();
    const WATCHERS: usize = 6;
    const CHANGES: u32 = 200;

    let logs: Vec<Arc<Mutex<Vec<u32>>>> = (0..WATCHERS).map(|_| Arc::default()).collect();
    let cell = AtomicCell::new(0u32);
    for (i, log) in logs.iter().enumerate() {
        let log = Arc::clone(log);
        cell.watch(format!("w{}", i), move |_, _, _, new| log.lock().push(*new));
    }

    for _ in 0..CHANGES {
        cell.update(|n| n + 1);
    }
    eventually("notifications", SETTLE, || cell.notifications_idle());

    let expected: Vec<u32> = (1..=CHANGES).collect();
    for log in &logs {
        assert_eq!(*log.lock(), expected);
    }
}

/// Test that a watcher removing itself suppresses the following change
#[test]
fn test_unwatch_inside_watcher() {
    init_tracing();
    let fired = Arc::new(AtomicUsize::new(0));
    let cell = AtomicCell::new(0);

    let f = Arc::clone(&fired);
    cell.watch("one-shot", move |key, cell, _, _| {
        f.fetch_add(1, Ordering::SeqCst);
        cell.unwatch(key.as_str());
    });

    cell.set(1);
    eventually("notifications", SETTLE, || cell.notifications_idle());
    cell.set(2);
    eventually("notifications", SETTLE, || cell.notifications_idle());

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Test that a panicking watcher does not stop its siblings
#[test]
fn test_panicking_watcher_is_isolated() {
    init_tracing();
    let seen = Arc::new(AtomicUsize::new(0));
    let cell = AtomicCell::new(0);

    cell.watch("broken", |_, _, _, _| panic!("watcher failure"));
    let s = Arc::clone(&seen);
    cell.watch("healthy", move |_, _, _, _| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    for i in 1..=5 {
        cell.set(i);
    }
    eventually("notifications", SETTLE, || cell.notifications_idle());

    assert_eq!(seen.load(Ordering::SeqCst), 5);
    assert_eq!(cell.watcher_failures(), 5);
}

/// Test that a fallible transform reports its error and leaves the value alone
#[test]
fn test_try_update_rejects_input() {
    let stock = AtomicCell::new(3u32);

    let taken = stock.try_update(|s| s.checked_sub(2).ok_or("out of stock"));
    assert_eq!(*taken.unwrap(), 1);
    let refused = stock.try_update(|s| s.checked_sub(2).ok_or("out of stock"));
    assert_eq!(refused.unwrap_err(), "out of stock");
    assert_eq!(*stock.get(), 1);
}

/// Test that a builder-configured cell uses its equality predicate
#[test]
fn test_builder_with_custom_equality() {
    init_tracing();
    let fired = Arc::new(AtomicUsize::new(0));
    // Only the integer part counts as a change.
    let cell = CellBuilder::new(1.0f64)
        .name("gauge")
        .equality(Equality::new(|a: &f64, b: &f64| a.trunc() == b.trunc()))
        .build()
        .unwrap();

    let f = Arc::clone(&fired);
    cell.watch("count", move |_, _, _, _| {
        f.fetch_add(1, Ordering::SeqCst);
    });

    cell.set(1.5);
    cell.set(2.1);
    cell.set(2.9);
    eventually("notifications", SETTLE, || cell.notifications_idle());

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

/// Test that a writer slow to hand off its change cannot be overtaken
#[test]
fn test_slow_handoff_keeps_commit_order() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::new()));
    let cell = CellBuilder::new(0u32)
        .name("ordered")
        .equality(Equality::new(|a: &u32, b: &u32| {
            if (*a, *b) == (0, 1) {
                thread::sleep(Duration::from_millis(200));
            }
            a == b
        }))
        .build()
        .unwrap();
    let sink = Arc::clone(&log);
    cell.watch("log", move |_, _, old, new| sink.lock().push((*old, *new)));

    thread::scope(|s| {
        s.spawn(|| {
            cell.update(|n| n + 1);
        });
        while cell.sequence() < 1 {
            thread::yield_now();
        }
        s.spawn(|| {
            cell.update(|n| n + 1);
        });
    });
    eventually("notifications", SETTLE, || cell.notifications_idle());

    assert_eq!(*log.lock(), vec![(0, 1), (1, 2)]);
}
