//! TCP transport.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use courier_core::Flag;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use super::{resolve_bind, with_deadline, NetworkKind, RawConnection, TransportError};
use crate::Address;

/// Stream transport over a TCP listener.
#[derive(Debug)]
pub struct TcpTransport {
    /// Taken on close so the port is released once in-flight accepts return.
    listener: RwLock<Option<Arc<TcpListener>>>,
    local: Address,
    closed: CancellationToken,
    state: Flag,
}

impl TcpTransport {
    /// Bind a TCP listener to `address`.
    pub async fn bind(address: &Address) -> Result<Self, TransportError> {
        let resolved = resolve_bind(address, NetworkKind::Stream).await?;
        let listener = TcpListener::bind(resolved).await?;
        let local = Address::from(listener.local_addr()?);
        tracing::debug!("TcpTransport bound to {}", local);

        Ok(Self {
            listener: RwLock::new(Some(Arc::new(listener))),
            local,
            closed: CancellationToken::new(),
            state: Flag::new(),
        })
    }

    fn listener(&self) -> Option<Arc<TcpListener>> {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the next peer connection.
    pub async fn accept(&self) -> Result<RawConnection, TransportError> {
        let listener = self.listener().ok_or(TransportError::Closed)?;

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                tracing::debug!("TcpTransport accepted connection from {}", peer);
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("TcpTransport: set_nodelay failed for {}: {}", peer, e);
                }
                Ok(RawConnection::Stream(stream))
            }
        }
    }

    /// Connect to `address` within `timeout`.
    pub async fn dial(
        &self,
        address: &Address,
        timeout: Duration,
    ) -> Result<RawConnection, TransportError> {
        if self.state.is_inactive() {
            return Err(TransportError::Closed);
        }

        let stream = with_deadline(timeout, TcpStream::connect(address.host_port())).await?;
        stream.set_nodelay(true)?;
        tracing::debug!("TcpTransport dialed {}", address);
        Ok(RawConnection::Stream(stream))
    }

    /// Stop accepting and drop the listener. Idempotent.
    pub fn close(&self) -> Result<(), TransportError> {
        if self.state.inactivate() {
            self.closed.cancel();
            self.listener
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            tracing::debug!("TcpTransport {} closed", self.local);
        }
        Ok(())
    }

    /// Resolved local address.
    pub fn local_address(&self) -> &Address {
        &self.local
    }
}
