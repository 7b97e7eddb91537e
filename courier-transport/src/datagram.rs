//! Inbound delivery envelope.

use crate::{Address, ConnectionError};

/// One unit delivered on the inbound channel.
///
/// Either carries a payload (`error` is `None`) or reports a read-side
/// failure with an empty payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Received bytes, exactly as the peer sent them.
    pub payload: Vec<u8>,
    /// Read-side failure, if this datagram reports one.
    pub error: Option<ConnectionError>,
    /// Address of the sending peer.
    pub from: Address,
    /// Local address the datagram arrived on.
    pub to: Address,
}

impl Datagram {
    /// A successfully received payload.
    pub fn new(payload: Vec<u8>, from: Address, to: Address) -> Self {
        Self {
            payload,
            error: None,
            from,
            to,
        }
    }

    /// A read-side failure with an empty payload.
    pub fn failed(error: ConnectionError, from: Address, to: Address) -> Self {
        Self {
            payload: Vec::new(),
            error: Some(error),
            from,
            to,
        }
    }

    /// Whether this datagram reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
