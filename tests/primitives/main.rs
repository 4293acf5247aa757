//! Primitives Integration Tests
//!
//! Exercises the public tessera API end to end:
//!
//! ## Modules
//!
//! - `cell`: AtomicCell updates, contention and watchers
//! - `agent`: ordered asynchronous updates, halting, relays between agents
//! - `queue`: LockFreeQueue and WorkQueue through the facade

mod common;

static_assertions::assert_impl_all!(tessera::AtomicCell<String>: Send, Sync, Clone);
static_assertions::assert_impl_all!(tessera::Agent<Vec<u8>>: Send, Sync, Clone);
static_assertions::assert_impl_all!(tessera::WorkQueue<Box<dyn FnOnce() + Send>>: Send, Sync);

mod cell;
mod queue;
