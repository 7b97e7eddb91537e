//! # Courier
//!
//! Peer-to-peer byte delivery over pooled TCP or UDP connections.
//!
//! A [`Communication`] binds a local address, accepts inbound connections in
//! the background and sends payloads to peers over reusable outbound
//! connections. Everything received, from every peer, arrives on one shared
//! [`Inbound`] channel as [`Datagram`]s.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              courier (this crate)                           │
//! │   Re-exports all functionality + prelude                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  courier-transport                          │
//! │  • Transport (TCP / UDP)   • Wire format (CRC32C frames)    │
//! │  • Connection + Receiver   • Communication (pool, accept)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    courier-core                             │
//! │  Flag, Queue, TaskSupervisor                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier::prelude::*;
//!
//! # async fn demo() -> Result<(), CommunicationError> {
//! let server = Communication::bind(CommunicationConfig::new("127.0.0.1:7000")).await?;
//! server.start()?;
//!
//! let client = Communication::bind(CommunicationConfig::local()).await?;
//! client.send(server.addr(), b"ping").await?;
//!
//! if let Some(datagram) = server.receive().recv().await {
//!     println!("{} bytes from {}", datagram.payload.len(), datagram.from);
//! }
//!
//! client.close().await?;
//! server.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Documentation
//!
//! - [`courier_core`] - Shutdown flag, notified queue, task supervisor
//! - [`courier_transport`] - Transports, framing and the communication endpoint

#![deny(missing_docs)]

// Re-export all public items from sub-crates
pub use courier_core;
pub use courier_transport;
pub use courier_transport::*;

/// Types needed by most users.
pub mod prelude {
    pub use courier_transport::{
        Address, Communication, CommunicationConfig, CommunicationError, Datagram, Inbound,
        NetworkKind, TaskSupervisor,
    };
}
