//! Network transports.
//!
//! A [`Transport`] binds one local address, hands out inbound raw
//! connections through [`Transport::accept`] and opens outbound ones through
//! [`Transport::dial`]. Two variants exist:
//!
//! | Variant | Socket | `accept` yields |
//! |---------|--------|-----------------|
//! | [`Transport::Stream`] | TCP listener | one [`RawConnection::Stream`] per peer connection |
//! | [`Transport::Datagram`] | UDP socket | the bound socket, once |
//!
//! Binding validates the address before any socket is opened: the transport
//! must know its own reachable address, so wildcard hosts are refused.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpStream, UdpSocket};

use crate::Address;

mod tcp;
mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Errors raised by transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The address is wildcard/unspecified or has no host.
    #[error("address can not be used: {0}")]
    InvalidAddress(Address),

    /// The address names a different network kind than the transport.
    #[error("address {address} is not a {expected} address")]
    WrongNetworkKind {
        /// Kind the transport serves.
        expected: NetworkKind,
        /// Offending address.
        address: Address,
    },

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// Underlying socket operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Network kind served by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkKind {
    /// Connection-oriented byte stream (TCP).
    #[default]
    Stream,
    /// Message-oriented datagrams (UDP).
    Datagram,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Stream => f.write_str("tcp"),
            NetworkKind::Datagram => f.write_str("udp"),
        }
    }
}

/// A freshly accepted or dialed socket, before framing is attached.
#[derive(Debug)]
pub enum RawConnection {
    /// Connected TCP stream.
    Stream(TcpStream),
    /// UDP socket shared with the transport.
    Datagram(DatagramSocket),
}

impl RawConnection {
    /// Remote address, if the connection has a fixed peer.
    pub fn peer_address(&self) -> Option<Address> {
        match self {
            RawConnection::Stream(stream) => stream.peer_addr().ok().map(Address::from),
            RawConnection::Datagram(socket) => socket.peer.map(Address::from),
        }
    }

    /// Local address of the socket.
    pub fn local_address(&self) -> Option<Address> {
        match self {
            RawConnection::Stream(stream) => stream.local_addr().ok().map(Address::from),
            RawConnection::Datagram(socket) => socket.socket.local_addr().ok().map(Address::from),
        }
    }
}

/// UDP socket plus the peer it sends to.
///
/// Accepted datagram connections have no peer: they only receive, from
/// anyone. Dialed ones send to `peer` from the transport's bound socket.
#[derive(Debug, Clone)]
pub struct DatagramSocket {
    pub(crate) socket: Arc<UdpSocket>,
    pub(crate) peer: Option<SocketAddr>,
}

/// Closed set of transport implementations.
#[derive(Debug)]
pub enum Transport {
    /// TCP transport.
    Stream(TcpTransport),
    /// UDP transport.
    Datagram(UdpTransport),
}

impl Transport {
    /// Bind a transport of `kind` to `address`.
    ///
    /// # Errors
    ///
    /// - [`TransportError::WrongNetworkKind`] if the address scheme names the other kind
    /// - [`TransportError::InvalidAddress`] for wildcard or host-less addresses
    /// - [`TransportError::Io`] if resolution or binding fails
    pub async fn bind(kind: NetworkKind, address: &Address) -> Result<Self, TransportError> {
        match kind {
            NetworkKind::Stream => TcpTransport::bind(address).await.map(Transport::Stream),
            NetworkKind::Datagram => UdpTransport::bind(address).await.map(Transport::Datagram),
        }
    }

    /// Wait for the next inbound raw connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once [`close`](Self::close) was called.
    pub async fn accept(&self) -> Result<RawConnection, TransportError> {
        match self {
            Transport::Stream(tcp) => tcp.accept().await,
            Transport::Datagram(udp) => udp.accept().await,
        }
    }

    /// Open an outbound raw connection to `address`.
    ///
    /// A zero `timeout` leaves the deadline to the operating system.
    pub async fn dial(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<RawConnection, TransportError> {
        if let Some(kind) = address.network() {
            if kind != self.kind() {
                return Err(TransportError::WrongNetworkKind {
                    expected: self.kind(),
                    address: address.clone(),
                });
            }
        }

        match self {
            Transport::Stream(tcp) => tcp.dial(address, timeout).await,
            Transport::Datagram(udp) => udp.dial(address, timeout).await,
        }
    }

    /// Stop accepting and release the bound socket. Idempotent.
    pub fn close(&self) -> Result<(), TransportError> {
        match self {
            Transport::Stream(tcp) => tcp.close(),
            Transport::Datagram(udp) => udp.close(),
        }
    }

    /// Resolved local address (real port when bound to port 0).
    pub fn local_address(&self) -> &Address {
        match self {
            Transport::Stream(tcp) => tcp.local_address(),
            Transport::Datagram(udp) => udp.local_address(),
        }
    }

    /// Network kind of this transport.
    pub fn kind(&self) -> NetworkKind {
        match self {
            Transport::Stream(_) => NetworkKind::Stream,
            Transport::Datagram(_) => NetworkKind::Datagram,
        }
    }
}

/// Validate and resolve a bind address to one socket address.
async fn resolve_bind(address: &Address, kind: NetworkKind) -> Result<SocketAddr, TransportError> {
    let host_port = address.validate_bind(kind)?;
    let resolved = tokio::net::lookup_host(host_port)
        .await?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(address.clone()))?;
    address.check_bindable(resolved)?;
    Ok(resolved)
}

/// Run `future` under `timeout`, zero meaning no deadline.
async fn with_deadline<T>(
    timeout: Duration,
    future: impl std::future::Future<Output = io::Result<T>>,
) -> io::Result<T> {
    if timeout.is_zero() {
        return future.await;
    }
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("dial timed out after {timeout:?}"),
        )),
    }
}
