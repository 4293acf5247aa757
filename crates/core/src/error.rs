//! Error types for tessera
//!
//! Everything that can fail in the primitives funnels into [`Error`]. Note
//! what is *not* here: CAS contention is retried internally and never
//! surfaces as an error, and watcher panics are isolated and logged rather
//! than returned to anyone.

use std::any::Any;
use thiserror::Error;

/// All tessera errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The queue's worker stopped after a failing job; queued work will not run
    #[error("queue '{queue}' halted: {reason}")]
    Halted {
        /// Name of the halted queue
        queue: String,
        /// Failure that halted it
        reason: String,
    },

    /// A fallible action rejected its input
    #[error("action failed: {0}")]
    Action(String),

    /// A job or action panicked
    #[error("panicked: {0}")]
    Panicked(String),

    /// The worker could not be started
    ///
    /// The job stays queued and runs once a later enqueue starts a worker.
    /// Change notifiers have no caller to return this to; they count it in
    /// `spawn_failures` instead.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// Builder or options validation failure
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap any displayable action failure.
    pub fn action(err: impl std::fmt::Display) -> Self {
        Error::Action(err.to_string())
    }

    /// Check if this error means the queue will never run another job.
    pub fn is_halted(&self) -> bool {
        matches!(self, Error::Halted { .. })
    }

    /// Check if this error is retryable.
    ///
    /// Only spawn failures are: the job stays queued and the next enqueue
    /// tries to start a worker again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Spawn(_))
    }
}

/// Render a panic payload as text.
///
/// Panics raised with `panic!("...")` carry either a `&'static str` or a
/// `String`; anything else is reported generically.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
