//! Error types for connection operations.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::WireError;

/// Errors that can occur while reading from or writing to a connection.
///
/// Cloneable so a read failure can travel inside a [`Datagram`](crate::Datagram).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection was closed locally or by the peer.
    #[error("connection closed")]
    Closed,

    /// A read or write did not finish within the configured timeout.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A frame could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl ConnectionError {
    /// Map a stream I/O error, folding "the socket is gone" kinds into
    /// [`ConnectionError::Closed`].
    pub(crate) fn from_stream_io(error: io::Error) -> Self {
        if is_disconnect(&error) {
            ConnectionError::Closed
        } else {
            ConnectionError::Io(error.to_string())
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        ConnectionError::Io(error.to_string())
    }
}

/// Error kinds meaning the peer or the local side tore the socket down.
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
