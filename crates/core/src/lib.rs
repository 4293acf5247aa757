//! Core types for tessera
//!
//! This crate holds the pieces every other tessera crate shares:
//! - Error: the single error enum and `Result` alias
//! - QueueOptions / FailurePolicy: how a work queue names, spawns and fails
//! - Spawner: the seam that starts short-lived background workers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod options;
pub mod spawn;

pub use error::{panic_message, Error, Result};
pub use options::{FailurePolicy, QueueOptions, DEFAULT_QUEUE_NAME};
pub use spawn::{Spawner, Task, ThreadSpawner};

#[cfg(feature = "tokio")]
pub use spawn::TokioSpawner;
