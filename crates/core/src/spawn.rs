//! Worker spawning
//!
//! Work queues never keep a thread parked waiting for work. Each burst of
//! activity starts a fresh worker through a [`Spawner`], and the worker exits
//! as soon as it observes an empty queue.
//!
//! - [`ThreadSpawner`]: one named OS thread per burst (default)
//! - [`TokioSpawner`]: the blocking pool of a tokio runtime (feature `tokio`)

use crate::error::Result;
use std::fmt;
use std::thread;

/// A unit of work handed to a spawner.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Starts background workers.
///
/// Implementations must run `task` to completion on some other thread and
/// must not run it inline: the caller may be a producer that still has to
/// return to its own caller.
pub trait Spawner: Send + Sync + fmt::Debug {
    /// Start `task` as a worker named `name`.
    fn spawn(&self, name: &str, task: Task) -> Result<()>;
}

/// Spawns each worker on its own OS thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpawner {
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    /// Create a spawner using the platform default stack size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom stack size (in bytes) for every worker thread.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Configured stack size, if any.
    pub fn stack_size(&self) -> Option<usize> {
        self.stack_size
    }
}

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: &str, task: Task) -> Result<()> {
        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        // Detached: the worker retires on its own once the queue drains.
        builder.spawn(task)?;
        Ok(())
    }
}

/// Spawns workers on a tokio runtime's blocking pool.
///
/// Workers run user transforms synchronously and may busy-retry a CAS, so
/// they belong on the blocking pool rather than on the async executors.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioSpawner {
    /// Spawn onto the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawn onto the runtime the caller is currently running inside.
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| crate::Error::InvalidConfig(format!("no tokio runtime: {}", e)))
    }
}

#[cfg(feature = "tokio")]
impl Spawner for TokioSpawner {
    fn spawn(&self, name: &str, task: Task) -> Result<()> {
        tracing::trace!(worker = name, "spawning worker on blocking pool");
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}
