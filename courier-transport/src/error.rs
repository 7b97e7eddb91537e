//! Error types for the communication layer.

use courier_core::SupervisorError;

use crate::{ConnectionError, TransportError};

/// Errors returned by [`Communication`](crate::Communication).
#[derive(Debug, thiserror::Error)]
pub enum CommunicationError {
    /// The instance was closed, or its parent scope was cancelled.
    #[error("communication already closed")]
    AlreadyClosed,

    /// Binding, dialing or closing the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Writing to or closing a connection failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A background task could not be spawned.
    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
}

impl CommunicationError {
    /// Whether this error reports an invalid or wildcard bind address.
    pub fn is_invalid_address(&self) -> bool {
        matches!(
            self,
            CommunicationError::Transport(TransportError::InvalidAddress(_))
        )
    }
}

/// Result type for communication operations.
pub type CommunicationResult<T> = Result<T, CommunicationError>;
