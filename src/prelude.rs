//! Convenient imports for Tessera.
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let cell = AtomicCell::new(0);
//! cell.update(|n| n + 1);
//! ```

// Primitives
pub use crate::{Agent, AtomicCell};

// Builders
pub use crate::{AgentBuilder, CellBuilder};

// Change detection
pub use crate::{Equality, WatchKey};

// Error handling
pub use crate::{Error, Result};

// Configuration
pub use crate::{FailurePolicy, QueueOptions};
