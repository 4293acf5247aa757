//! State cells for tessera
//!
//! This crate implements the synchronous half of tessera:
//! - AtomicCell: one shared value, wait-free reads, CAS-retry writes
//! - ChangeNotifier: keyed watchers run asynchronously, one batch per change
//! - Equality: the predicate deciding whether a commit is a change
//! - CellBuilder: named cells and custom notifier queues
//!
//! ## Transform Purity
//!
//! `update` closures may run more than once when writers collide. They must
//! be pure functions of the current value (and bound arguments): no I/O, no
//! mutation of captured state, no logging. A retried transform only wastes
//! work, it must never be observable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod cell;
pub mod equality;
pub mod notifier;
pub mod watch;

pub use builder::CellBuilder;
pub use cell::{AtomicCell, UpdateOutcome};
pub use equality::Equality;
pub use notifier::{ChangeNotifier, FIRST_SEQUENCE};
pub use watch::{WatchFn, WatchKey, WatcherRegistry};
