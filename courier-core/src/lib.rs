//! # courier-core
//!
//! Runtime primitives shared by the courier transport:
//!
//! - [`Flag`]: one-way `active → inactive` switch for idempotent shutdown
//! - [`Queue`]: thread-safe FIFO with a "has elements" notification
//! - [`TaskSupervisor`]: tracks every background task so shutdown can wait
//!   for all of them

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod flag;
mod queue;
mod supervisor;

pub use flag::Flag;
pub use queue::Queue;
pub use supervisor::{SupervisorError, TaskSupervisor};
