//! Communication endpoint: accept loop, outbound pool and inbound delivery.
//!
//! [`Communication`] binds one [`Transport`](crate::Transport) and offers:
//!
//! - [`send`](Communication::send): write a payload to a peer over a pooled
//!   outbound connection
//! - [`receive`](Communication::receive): the shared [`Inbound`] channel fed
//!   by every accepted connection
//! - [`close`](Communication::close): idempotent shutdown that waits for every
//!   background task
//!
//! # Lifecycle
//!
//! ```text
//! bind ──► start ──► (send / receive)* ──► close
//!            │
//!            └─ accept loop ─► per connection: listen task + receiver pump
//! ```

mod config;
mod core;
mod inbound;

pub use self::core::Communication;
pub use config::{CommunicationConfig, DEFAULT_INBOUND_CAPACITY};
pub use inbound::Inbound;
