//! Frame readers and writers over raw sockets.
//!
//! The read side accumulates bytes in a `BytesMut` and parses complete frames
//! with [`try_deserialize_frame`]. Reads are cancel-safe: a deadline or
//! cancellation firing mid-frame leaves the partial bytes in the buffer for
//! the next call.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UdpSocket;

use super::error::{ConnectionError, ConnectionResult};
use crate::transport::{DatagramSocket, RawConnection};
use crate::wire::{
    frame_length, serialize_frame, try_deserialize_frame, FrameKind, WireError, HEADER_SIZE,
};

/// Largest UDP payload we ever receive.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity for streams.
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// One decoded frame.
#[derive(Debug)]
pub(crate) struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
    /// Datagram source; `None` for streams, whose peer is fixed.
    pub source: Option<SocketAddr>,
}

/// Split a raw connection into its decoding and encoding halves.
pub(crate) fn split(raw: RawConnection) -> (FrameReader, FrameWriter) {
    match raw {
        RawConnection::Stream(stream) => {
            let (read, write) = stream.into_split();
            (
                FrameReader::Stream {
                    half: read,
                    buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
                    desynced: false,
                },
                FrameWriter::Stream(BufWriter::new(write)),
            )
        }
        RawConnection::Datagram(socket) => (
            FrameReader::Datagram {
                socket: socket.socket.clone(),
                buffer: BytesMut::new(),
                scratch: vec![0u8; MAX_DATAGRAM_SIZE],
                source: None,
            },
            FrameWriter::Datagram(socket),
        ),
    }
}

/// Decoding half of a connection.
pub(crate) enum FrameReader {
    Stream {
        half: OwnedReadHalf,
        buffer: BytesMut,
        /// Set once a bad length field made frame boundaries unknowable.
        desynced: bool,
    },
    Datagram {
        socket: Arc<UdpSocket>,
        /// Unparsed remainder of the current datagram.
        buffer: BytesMut,
        scratch: Vec<u8>,
        source: Option<SocketAddr>,
    },
}

impl FrameReader {
    /// Source of the most recent datagram; always `None` for streams.
    pub(crate) fn last_source(&self) -> Option<SocketAddr> {
        match self {
            FrameReader::Stream { .. } => None,
            FrameReader::Datagram { source, .. } => *source,
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns [`ConnectionError::Closed`] when the stream ended.
    pub(crate) async fn read_frame(&mut self) -> ConnectionResult<Frame> {
        match self {
            FrameReader::Stream {
                half,
                buffer,
                desynced,
            } => {
                if *desynced {
                    return Err(ConnectionError::Closed);
                }
                loop {
                    match try_deserialize_frame(buffer) {
                        Ok(Some((kind, payload, consumed))) => {
                            buffer.advance(consumed);
                            return Ok(Frame {
                                kind,
                                payload,
                                source: None,
                            });
                        }
                        Ok(None) => {}
                        Err(e) => {
                            if e.desynchronizes() {
                                tracing::warn!("FrameReader: {} - stream desynchronized", e);
                                *desynced = true;
                                buffer.clear();
                            } else if let Some(length) = frame_length(buffer) {
                                buffer.advance(length);
                            }
                            return Err(e.into());
                        }
                    }

                    let read = half
                        .read_buf(buffer)
                        .await
                        .map_err(ConnectionError::from_stream_io)?;
                    if read == 0 {
                        return Err(ConnectionError::Closed);
                    }
                }
            }
            FrameReader::Datagram {
                socket,
                buffer,
                scratch,
                source,
            } => loop {
                if !buffer.is_empty() {
                    match try_deserialize_frame(buffer) {
                        Ok(Some((kind, payload, consumed))) => {
                            buffer.advance(consumed);
                            return Ok(Frame {
                                kind,
                                payload,
                                source: *source,
                            });
                        }
                        Ok(None) => {
                            // Frames never span datagrams, so a short one is corrupt.
                            let error = WireError::InsufficientData {
                                needed: frame_length(buffer).unwrap_or(HEADER_SIZE),
                                have: buffer.len(),
                            };
                            buffer.clear();
                            return Err(error.into());
                        }
                        Err(e) => {
                            // Frames never span datagrams: drop the rest of this one.
                            buffer.clear();
                            return Err(e.into());
                        }
                    }
                }

                let (read, from) = socket.recv_from(scratch).await?;
                *source = Some(from);
                buffer.extend_from_slice(&scratch[..read]);
            },
        }
    }
}

/// Encoding half of a connection.
pub(crate) enum FrameWriter {
    Stream(BufWriter<OwnedWriteHalf>),
    Datagram(DatagramSocket),
}

impl FrameWriter {
    /// Encode and flush one frame.
    pub(crate) async fn write_frame(
        &mut self,
        kind: FrameKind,
        payload: &[u8],
    ) -> ConnectionResult<()> {
        let frame = serialize_frame(kind, payload)?;
        match self {
            FrameWriter::Stream(writer) => {
                writer
                    .write_all(&frame)
                    .await
                    .map_err(ConnectionError::from_stream_io)?;
                writer
                    .flush()
                    .await
                    .map_err(ConnectionError::from_stream_io)?;
            }
            FrameWriter::Datagram(DatagramSocket { socket, peer }) => {
                let peer = peer.ok_or_else(|| {
                    ConnectionError::Io("datagram connection has no peer to send to".to_string())
                })?;
                socket.send_to(&frame, peer).await?;
            }
        }
        Ok(())
    }

    /// Flush and shut down the write side.
    pub(crate) async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            FrameWriter::Stream(writer) => writer.shutdown().await,
            FrameWriter::Datagram(_) => Ok(()),
        }
    }

    /// Whether this writer needs to announce the local address.
    pub(crate) fn is_stream(&self) -> bool {
        matches!(self, FrameWriter::Stream(_))
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameReader::Stream { .. } => f.write_str("FrameReader::Stream"),
            FrameReader::Datagram { .. } => f.write_str("FrameReader::Datagram"),
        }
    }
}

impl fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameWriter::Stream(_) => f.write_str("FrameWriter::Stream"),
            FrameWriter::Datagram(_) => f.write_str("FrameWriter::Datagram"),
        }
    }
}
