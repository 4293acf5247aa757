//! Agents for tessera
//!
//! An [`Agent`] is an [`AtomicCell`](tessera_cell::AtomicCell) that is only
//! written through its own [`WorkQueue`](tessera_queue::WorkQueue). Senders
//! hand over an action and return at once; the agent's worker applies the
//! actions one at a time, in the order they were sent.
//!
//! ## Failure
//!
//! An action that returns an error or panics halts its agent: the state keeps
//! the last good value, queued actions are dropped without running, and
//! further sends fail with `Error::Halted`. [`Agent::error`] reports the cause. Other agents are not
//! affected.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod builder;

pub use agent::{Action, Agent};
pub use builder::AgentBuilder;
