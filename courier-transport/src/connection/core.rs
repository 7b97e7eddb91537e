//! Connection state and read/write loops.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use courier_core::Flag;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::{ConnectionError, ConnectionResult};
use super::framing::{split, FrameReader, FrameWriter};
use crate::transport::RawConnection;
use crate::wire::{FrameKind, WireError};
use crate::{Address, Datagram, Receiver};

/// Upper bound on flushing the write side during close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// One framed connection to a peer.
///
/// Reads and writes may run concurrently: each side sits behind its own
/// lock. [`close`](Self::close) cancels both and is idempotent.
#[derive(Debug)]
pub struct Connection {
    /// Remote address; updated by the peer's hello frame on stream connections.
    peer: RwLock<Option<Address>>,
    local: Address,
    timeout: Duration,
    reader: Mutex<Option<FrameReader>>,
    writer: Mutex<Option<FrameWriter>>,
    token: CancellationToken,
    state: Flag,
}

impl Connection {
    /// Wrap a raw connection accepted by the transport.
    ///
    /// `local` is the transport's bound address, used as `to` on every
    /// delivered datagram. `token` is cancelled when the connection closes;
    /// pass a child of the owner's token so shutdown cascades.
    pub fn inbound(
        raw: RawConnection,
        local: Address,
        timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        let peer = raw.peer_address();
        Self::new(raw, peer, local, timeout, token)
    }

    /// Wrap a raw connection dialed to `target`.
    pub fn outbound(
        raw: RawConnection,
        target: Address,
        local: Address,
        timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        Self::new(raw, Some(target), local, timeout, token)
    }

    fn new(
        raw: RawConnection,
        peer: Option<Address>,
        local: Address,
        timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        let (reader, writer) = split(raw);
        Self {
            peer: RwLock::new(peer),
            local,
            timeout,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            token,
            state: Flag::new(),
        }
    }

    /// Remote address, if known.
    pub fn peer(&self) -> Option<Address> {
        self.peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Local address datagrams are delivered to.
    pub fn local(&self) -> &Address {
        &self.local
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.is_inactive()
    }

    /// Send one payload as a single frame.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::Closed`] if the connection is closed or closes mid-write
    /// - [`ConnectionError::TimedOut`] if the write exceeded the timeout
    /// - [`ConnectionError::Wire`] if the payload is too large to frame
    pub async fn write(&self, payload: &[u8]) -> ConnectionResult<()> {
        self.write_frame(FrameKind::Data, payload).await
    }

    /// Tell the remote side which address this connection's owner listens on.
    ///
    /// Only stream connections carry the hello frame; datagram receivers
    /// read the sender from the packet source instead.
    pub async fn announce(&self, address: &Address) -> ConnectionResult<()> {
        let is_stream = {
            let writer = self.writer.lock().await;
            writer.as_ref().map(FrameWriter::is_stream).unwrap_or(false)
        };
        if !is_stream {
            return Ok(());
        }
        self.write_frame(FrameKind::Hello, address.as_str().as_bytes())
            .await
    }

    async fn write_frame(&self, kind: FrameKind, payload: &[u8]) -> ConnectionResult<()> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::Closed)?;

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ConnectionError::Closed),
            result = with_timeout(self.timeout, writer.write_frame(kind, payload)) => result,
        }
    }

    /// Read frames until the connection closes, handing each to `receiver`.
    ///
    /// Data frames become datagrams, even empty ones. A hello frame updates
    /// the peer address, or is reported as an error datagram if it does not
    /// carry UTF-8. Decode failures, I/O
    /// failures and read deadline expiry (when a timeout is configured) are
    /// delivered as error datagrams and reading continues; a disconnect or
    /// cancellation ends the loop quietly.
    pub async fn listen(&self, receiver: &Receiver) {
        let mut guard = self.reader.lock().await;
        let Some(reader) = guard.as_mut() else {
            return;
        };

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                frame = with_timeout(self.timeout, reader.read_frame()) => frame,
            };

            match frame {
                Ok(frame) => match frame.kind {
                    FrameKind::Hello => match String::from_utf8(frame.payload) {
                        Ok(address) => {
                            tracing::debug!("Connection {} announced as {}", self.local, address);
                            *self.peer.write().unwrap_or_else(PoisonError::into_inner) =
                                Some(Address::new(address));
                        }
                        Err(e) => {
                            tracing::warn!("Connection {}: invalid hello frame: {}", self.local, e);
                            let from = self.sender(frame.source);
                            let error = ConnectionError::Wire(WireError::InvalidHello);
                            receiver
                                .add_response(Datagram::failed(error, from, self.local.clone()))
                                .await;
                        }
                    },
                    FrameKind::Data => {
                        let from = self.sender(frame.source);
                        let datagram = Datagram::new(frame.payload, from, self.local.clone());
                        receiver.add_response(datagram).await;
                    }
                },
                Err(ConnectionError::Closed) => break,
                Err(e) => {
                    tracing::debug!("Connection {} read failed: {}", self.local, e);
                    let from = self.sender(reader.last_source());
                    receiver
                        .add_response(Datagram::failed(e, from, self.local.clone()))
                        .await;
                }
            }
        }

        guard.take();
        tracing::trace!("Connection {} stopped listening", self.local);
    }

    fn sender(&self, source: Option<SocketAddr>) -> Address {
        match source {
            Some(source) => Address::from(source),
            None => self.peer().unwrap_or_else(|| Address::new("")),
        }
    }

    /// Close the connection. Idempotent.
    ///
    /// Cancels in-flight reads and writes, then shuts the write side down.
    /// The read side is released by [`listen`](Self::listen) when it returns.
    pub async fn close(&self) -> ConnectionResult<()> {
        if !self.state.inactivate() {
            return Ok(());
        }
        self.token.cancel();

        let writer = self.writer.lock().await.take();
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }

        let Some(mut writer) = writer else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if super::error::is_disconnect(&e) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ConnectionError::TimedOut(SHUTDOWN_TIMEOUT)),
        }
    }
}

/// Bound `future` by `timeout`; zero means no bound.
async fn with_timeout<F, T>(timeout: Duration, future: F) -> ConnectionResult<T>
where
    F: Future<Output = ConnectionResult<T>>,
{
    if timeout.is_zero() {
        return future.await;
    }
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::TimedOut(timeout)),
    }
}
