//! Change detection
//!
//! A commit only notifies watchers when the old and new values differ under
//! the cell's [`Equality`]. The default is structural (`PartialEq`); cells of
//! types without `PartialEq`, or that want "every commit is a change", pick
//! their own.

use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether two values count as the same state.
pub struct Equality<T: ?Sized> {
    eq: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T: ?Sized> Equality<T> {
    /// Use a custom predicate.
    pub fn new<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Equality { eq: Arc::new(eq) }
    }

    /// Treat every commit as a change.
    pub fn never() -> Self
    where
        T: 'static,
    {
        Equality::new(|_, _| false)
    }

    /// Compare two values.
    #[inline]
    pub fn eq(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }
}

impl<T: PartialEq + ?Sized + 'static> Equality<T> {
    /// Structural equality via `PartialEq`.
    pub fn structural() -> Self {
        Equality::new(|a: &T, b: &T| a == b)
    }
}

impl<T: PartialEq + ?Sized + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::structural()
    }
}

impl<T: ?Sized> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Equality {
            eq: Arc::clone(&self.eq),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equality(..)")
    }
}
