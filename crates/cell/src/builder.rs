//! Cell builder
//!
//! ```ignore
//! let cell = AtomicCell::builder(0u64)
//!     .name("hits")
//!     .equality(Equality::never())
//!     .build()?;
//! ```

use crate::cell::AtomicCell;
use crate::equality::Equality;
use crate::notifier::ChangeNotifier;
use std::fmt;
use tessera_core::{Error, FailurePolicy, QueueOptions, Result};

/// Configures an [`AtomicCell`] before creating it.
pub struct CellBuilder<T> {
    initial: T,
    equality: Equality<T>,
    name: Option<String>,
    notifier_options: Option<QueueOptions>,
}

impl<T: PartialEq + 'static> CellBuilder<T> {
    /// Start from `initial` with structural equality.
    pub fn new(initial: T) -> Self {
        Self::with_equality(initial, Equality::structural())
    }
}

impl<T> CellBuilder<T> {
    /// Start from `initial` with a custom change predicate.
    pub fn with_equality(initial: T, equality: Equality<T>) -> Self {
        CellBuilder {
            initial,
            equality,
            name: None,
            notifier_options: None,
        }
    }

    /// Name the cell. The notifier worker is named `<name>-watchers`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the change predicate.
    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    /// Queue options for the notifier.
    ///
    /// The failure policy is always `Isolate`; a name set with
    /// [`name`](Self::name) takes precedence over the one given here.
    pub fn notifier_options(mut self, options: QueueOptions) -> Self {
        self.notifier_options = Some(options);
        self
    }
}

impl<T: Send + Sync + 'static> CellBuilder<T> {
    /// Create the cell.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` if the name is empty or not usable as a
    /// thread name.
    pub fn build(self) -> Result<AtomicCell<T>> {
        let mut options = self.notifier_options.unwrap_or_else(QueueOptions::isolating);
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidConfig("cell name must not be empty".into()));
            }
            options.name = format!("{}-watchers", name);
        }
        let options = options.with_failure_policy(FailurePolicy::Isolate);

        let notifier = ChangeNotifier::with_options(self.equality, options)?;
        Ok(AtomicCell::from_parts(self.initial, notifier))
    }
}

impl<T: fmt::Debug> fmt::Debug for CellBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellBuilder")
            .field("initial", &self.initial)
            .field("name", &self.name)
            .field("notifier_options", &self.notifier_options)
            .finish()
    }
}
