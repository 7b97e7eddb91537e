//! UDP transport.
//!
//! Datagrams have no connections, so the bound socket itself is the single
//! inbound "connection": the first `accept` returns it and later calls wait
//! for the transport to close. Dialing does not open a socket either; the
//! returned connection sends from the bound socket so receivers see this
//! transport's address as the source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use courier_core::Flag;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use super::{
    resolve_bind, with_deadline, DatagramSocket, NetworkKind, RawConnection, TransportError,
};
use crate::Address;

/// Datagram transport over one bound UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: RwLock<Option<Arc<UdpSocket>>>,
    local: Address,
    closed: CancellationToken,
    state: Flag,
    handed_out: AtomicBool,
}

impl UdpTransport {
    /// Bind a UDP socket to `address`.
    pub async fn bind(address: &Address) -> Result<Self, TransportError> {
        let resolved = resolve_bind(address, NetworkKind::Datagram).await?;
        let socket = UdpSocket::bind(resolved).await?;
        let local = Address::from(socket.local_addr()?);
        tracing::debug!("UdpTransport bound to {}", local);

        Ok(Self {
            socket: RwLock::new(Some(Arc::new(socket))),
            local,
            closed: CancellationToken::new(),
            state: Flag::new(),
            handed_out: AtomicBool::new(false),
        })
    }

    fn socket(&self) -> Result<Arc<UdpSocket>, TransportError> {
        self.socket
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::Closed)
    }

    /// Hand out the bound socket once, then wait for close.
    pub async fn accept(&self) -> Result<RawConnection, TransportError> {
        let socket = self.socket()?;
        if !self.handed_out.swap(true, Ordering::AcqRel) {
            return Ok(RawConnection::Datagram(DatagramSocket { socket, peer: None }));
        }
        drop(socket);

        self.closed.cancelled().await;
        Err(TransportError::Closed)
    }

    /// Resolve `address` and return a sender bound to it.
    pub async fn dial(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<RawConnection, TransportError> {
        let socket = self.socket()?;
        let peer = with_deadline(timeout, async {
            tokio::net::lookup_host(address.host_port())
                .await?
                .next()
                .ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        format!("{address} did not resolve"),
                    )
                })
        })
        .await?;

        tracing::debug!("UdpTransport dialed {} ({})", address, peer);
        Ok(RawConnection::Datagram(DatagramSocket {
            socket,
            peer: Some(peer),
        }))
    }

    /// Wake pending accepts and drop the transport's socket handle. Idempotent.
    pub fn close(&self) -> Result<(), TransportError> {
        if self.state.inactivate() {
            self.closed.cancel();
            self.socket
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            tracing::debug!("UdpTransport {} closed", self.local);
        }
        Ok(())
    }

    /// Resolved local address.
    pub fn local_address(&self) -> &Address {
        &self.local
    }
}
