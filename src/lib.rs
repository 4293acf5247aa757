//! # Tessera
//!
//! Lock-free shared state for threaded Rust programs.
//!
//! Tessera provides two ways to share one value between threads, plus the
//! machinery underneath them:
//!
//! ## Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! // Synchronous: update returns once the new value is committed
//! let hits = AtomicCell::new(0u64);
//! hits.update(|n| n + 1);
//!
//! // Asynchronous: send returns at once, actions apply in order
//! let log = Agent::new(Vec::<String>::new());
//! log.send(|v| {
//!     let mut v = v.clone();
//!     v.push("started".into());
//!     v
//! })?;
//!
//! // Both report changes to keyed watchers
//! hits.watch("print", |_key, _cell, old, new| println!("{} -> {}", old, new));
//! ```
//!
//! ## Primitives
//!
//! - [`AtomicCell`] - CAS-updated cell: wait-free reads, lock-free writes
//! - [`Agent`] - cell whose updates are queued and applied one at a time
//! - [`WorkQueue`] - job queue drained by an on-demand worker
//! - [`LockFreeQueue`] - intrusive multi-producer single-consumer queue
//!
//! ## Choosing
//!
//! Use a cell when the caller needs the new value right away and the
//! transform is cheap and pure. Use an agent when updates are slow, have side
//! effects, or must never run twice.

#![warn(missing_docs)]

pub mod prelude;

// Re-export main entry points
pub use tessera_agent::{Agent, AgentBuilder};
pub use tessera_cell::{AtomicCell, CellBuilder, Equality, UpdateOutcome, WatchKey};

// Re-export the machinery
pub use tessera_cell::{ChangeNotifier, WatchFn, WatcherRegistry};
pub use tessera_queue::{LockFreeQueue, WorkQueue};

// Error handling and configuration
pub use tessera_core::{Error, FailurePolicy, QueueOptions, Result, Spawner, Task, ThreadSpawner};

#[cfg(feature = "tokio")]
pub use tessera_core::TokioSpawner;
