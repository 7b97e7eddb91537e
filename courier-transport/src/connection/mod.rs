//! Framed connections.
//!
//! A [`Connection`] wraps one raw socket with the frame codec from
//! [`wire`](crate::wire). Outbound connections are written to by
//! [`Communication::send`](crate::Communication::send) and pooled between
//! sends; inbound connections are read by [`Connection::listen`], which
//! forwards every frame to a [`Receiver`](crate::Receiver).

mod core;
mod error;
mod framing;

pub use self::core::Connection;
pub use error::{ConnectionError, ConnectionResult};
