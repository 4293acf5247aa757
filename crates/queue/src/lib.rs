//! Queues for tessera
//!
//! This crate implements the two queues every cell and agent is built on:
//! - LockFreeQueue: unbounded Vyukov MPSC queue (many producers, one consumer)
//! - WorkQueue: a LockFreeQueue drained by a worker that starts on the first
//!   enqueue against an idle queue and retires once the queue is empty
//!
//! # Loom Testing
//!
//! The MPSC queue is model-checked under loom:
//!
//! ```text
//! cargo test -p tessera-queue --features loom --release
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(unsafe_op_in_unsafe_fn)]

pub mod mpsc;
mod sync;
pub mod work_queue;

pub use mpsc::LockFreeQueue;
pub use work_queue::{Processor, WorkQueue};
