//! Work queue options
//!
//! ## Failure Policy
//!
//! A job can fail by returning an error or by panicking. What happens next is
//! the queue's [`FailurePolicy`]:
//!
//! | Policy | Failing job | Jobs behind it | Later enqueues |
//! |--------|-------------|----------------|----------------|
//! | `Halt` (default) | worker stops | discarded, never run | `Error::Halted` |
//! | `Isolate` | logged, skipped | run normally | accepted |
//!
//! Under `Halt`, jobs already accepted but queued behind the failing one are
//! abandoned: the halting worker drops them without running them. Refusing
//! later enqueues is best-effort. A producer that passed the halted check
//! just before the worker halted still gets `Ok(())`, and its job is never
//! run. Each agent owns its own queue, so a halt never spreads to unrelated
//! agents.

use crate::error::{Error, Result};
use crate::spawn::{Spawner, ThreadSpawner};
use std::fmt;
use std::sync::Arc;

/// Default worker name prefix.
pub const DEFAULT_QUEUE_NAME: &str = "tessera-worker";

/// What a work queue does when a job fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the worker and refuse further jobs
    #[default]
    Halt,
    /// Log the failure and continue with the next job
    Isolate,
}

/// Work queue options
#[derive(Clone)]
pub struct QueueOptions {
    /// Queue name, used as the worker thread name and in log fields
    pub name: String,
    /// Behavior when a job fails
    pub failure_policy: FailurePolicy,
    /// How workers are started
    pub spawner: Arc<dyn Spawner>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            name: DEFAULT_QUEUE_NAME.to_string(),
            failure_policy: FailurePolicy::Halt,
            spawner: Arc::new(ThreadSpawner::default()),
        }
    }
}

impl fmt::Debug for QueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueOptions")
            .field("name", &self.name)
            .field("failure_policy", &self.failure_policy)
            .field("spawner", &self.spawner)
            .finish()
    }
}

impl QueueOptions {
    /// Default options with a custom name
    pub fn named(name: impl Into<String>) -> Self {
        QueueOptions {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Options that log failing jobs and keep going
    ///
    /// Used by change notifiers, whose jobs isolate watcher panics anyway.
    pub fn isolating() -> Self {
        QueueOptions {
            failure_policy: FailurePolicy::Isolate,
            ..Default::default()
        }
    }

    /// Replace the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Replace the spawner
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Check the options are usable.
    ///
    /// Names end up as thread names, which may not contain NUL bytes.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("queue name must not be empty".into()));
        }
        if self.name.contains('\0') {
            return Err(Error::InvalidConfig(format!(
                "queue name {:?} contains a NUL byte",
                self.name
            )));
        }
        Ok(())
    }
}
