//! # Courier Transport Layer
//!
//! Peer-to-peer byte delivery over TCP or UDP.
//!
//! This crate provides:
//! - **Transport**: bound TCP or UDP socket handing out raw connections
//! - **Wire format**: length-prefixed frames with CRC32C checksums
//! - **Connection**: framed read/write over one raw connection
//! - **Receiver**: best-effort delivery into the shared inbound channel
//! - **Communication**: accept loop, outbound connection pool and shutdown

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use courier_core::{Flag, Queue, SupervisorError, TaskSupervisor};

// =============================================================================
// Modules
// =============================================================================

/// Error types for communication operations.
pub mod error;

/// Peer addresses.
pub mod address;

/// Inbound delivery envelope.
pub mod datagram;

/// TCP and UDP transports.
pub mod transport;

/// Frame format with CRC32C checksums.
pub mod wire;

/// Framed connections.
pub mod connection;

/// Best-effort delivery of inbound datagrams.
pub mod receiver;

/// Communication endpoint.
pub mod communication;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Error exports
pub use error::{CommunicationError, CommunicationResult};

// Address and datagram exports
pub use address::Address;
pub use datagram::Datagram;

// Transport exports
pub use transport::{NetworkKind, RawConnection, Transport, TransportError};

// Wire format exports
pub use wire::{
    FrameHeader, FrameKind, HEADER_SIZE, MAX_PAYLOAD_SIZE, WireError, deserialize_frame,
    serialize_frame, try_deserialize_frame,
};

// Connection exports
pub use connection::{Connection, ConnectionError, ConnectionResult};

// Delivery exports
pub use receiver::Receiver;

// Communication exports
pub use communication::{Communication, CommunicationConfig, DEFAULT_INBOUND_CAPACITY, Inbound};
