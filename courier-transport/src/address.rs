//! Peer addresses.
//!
//! An [`Address`] is an opaque `host:port` string, optionally prefixed with a
//! network scheme (`tcp://` or `udp://`). It is used verbatim as the key of the
//! outbound connection pool.

use std::fmt;
use std::net::SocketAddr;

use crate::transport::{NetworkKind, TransportError};

/// Network endpoint of a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Wrap an address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address exactly as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Network kind named by the scheme prefix, if any.
    pub fn network(&self) -> Option<NetworkKind> {
        self.split_scheme().0
    }

    /// The `host:port` part, scheme stripped.
    pub fn host_port(&self) -> &str {
        self.split_scheme().1
    }

    fn split_scheme(&self) -> (Option<NetworkKind>, &str) {
        if let Some(rest) = self.0.strip_prefix("tcp://") {
            (Some(NetworkKind::Stream), rest)
        } else if let Some(rest) = self.0.strip_prefix("udp://") {
            (Some(NetworkKind::Datagram), rest)
        } else {
            (None, self.0.as_str())
        }
    }

    /// Check that this address can be bound by a transport of `kind`.
    ///
    /// The transport has to know its own reachable address, so wildcard
    /// hosts and addresses without a host are rejected. Only the syntactic
    /// host check happens here; wildcard IPs are rejected once the address
    /// has been resolved.
    ///
    /// # Errors
    ///
    /// - [`TransportError::WrongNetworkKind`] if the scheme names another kind
    /// - [`TransportError::InvalidAddress`] if the host is missing
    pub fn validate_bind(&self, kind: NetworkKind) -> Result<&str, TransportError> {
        let (scheme, host_port) = self.split_scheme();
        if let Some(found) = scheme {
            if found != kind {
                return Err(TransportError::WrongNetworkKind {
                    expected: kind,
                    address: self.clone(),
                });
            }
        }

        let host = match host_port.rsplit_once(':') {
            Some((host, _port)) => host.trim_start_matches('[').trim_end_matches(']'),
            None => return Err(TransportError::InvalidAddress(self.clone())),
        };
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(self.clone()));
        }
        Ok(host_port)
    }

    /// Reject resolved wildcard addresses (`0.0.0.0`, `::`).
    pub(crate) fn check_bindable(&self, resolved: SocketAddr) -> Result<(), TransportError> {
        if resolved.ip().is_unspecified() {
            return Err(TransportError::InvalidAddress(self.clone()));
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl From<SocketAddr> for Address {
    fn from(address: SocketAddr) -> Self {
        Self(address.to_string())
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
