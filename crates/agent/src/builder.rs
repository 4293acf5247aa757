//! Agent builder

use crate::agent::Agent;
use std::sync::Arc;
use tessera_cell::{AtomicCell, ChangeNotifier, Equality};
use tessera_core::{Error, FailurePolicy, QueueOptions, Result, Spawner};

/// Configures an [`Agent`] before creating it.
///
/// ```ignore
/// let account = Agent::builder(100i64)
///     .name("account-42")
///     .failure_policy(FailurePolicy::Halt)
///     .build()?;
/// ```
pub struct AgentBuilder<T> {
    initial: T,
    equality: Equality<T>,
    options: QueueOptions,
    named: bool,
}

impl<T: PartialEq + 'static> AgentBuilder<T> {
    /// Start from `initial` with structural equality.
    pub fn new(initial: T) -> Self {
        Self::with_equality(initial, Equality::structural())
    }
}

impl<T> AgentBuilder<T> {
    /// Start from `initial` with a custom change predicate.
    pub fn with_equality(initial: T, equality: Equality<T>) -> Self {
        AgentBuilder {
            initial,
            equality,
            options: QueueOptions::default(),
            named: false,
        }
    }

    /// Name the agent. Used for the worker thread and in log fields.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = name.into();
        self.named = true;
        self
    }

    /// What happens when an action fails. Defaults to `Halt`.
    ///
    /// Under `Isolate` a failing action is logged and skipped, and the agent
    /// keeps applying the actions queued behind it.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.options.failure_policy = policy;
        self
    }

    /// How the agent's workers are started.
    pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.options.spawner = spawner;
        self
    }

    /// Replace the change predicate.
    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }
}

impl<T: Send + Sync + 'static> AgentBuilder<T> {
    /// Create the agent.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` if the name is empty or not usable as a
    /// thread name.
    pub fn build(self) -> Result<Agent<T>> {
        if self.options.name.trim().is_empty() {
            return Err(Error::InvalidConfig("agent name must not be empty".into()));
        }
        self.options.validate()?;

        let mut watchers = QueueOptions::isolating().with_spawner(Arc::clone(&self.options.spawner));
        if self.named {
            watchers = watchers.with_name(format!("{}-watchers", self.options.name));
        }
        let notifier = ChangeNotifier::with_options(self.equality.clone(), watchers)?;
        let cell = AtomicCell::with_equality(self.initial, self.equality);
        Agent::from_parts(cell, self.options, notifier)
    }
}
