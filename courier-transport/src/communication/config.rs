//! Configuration for a [`Communication`](super::Communication) instance.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{Address, NetworkKind};

/// Default capacity of the shared inbound channel.
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Configuration for binding a communication endpoint.
#[derive(Clone, Debug)]
pub struct CommunicationConfig {
    /// Local address to bind. Must name a concrete host.
    pub address: Address,

    /// Dial, write and read deadline. `Duration::ZERO` means no deadline.
    ///
    /// An inbound connection that stays silent for longer than this reports
    /// a timed-out error datagram and keeps listening.
    pub timeout: Duration,

    /// Maximum idle outbound connections kept per peer.
    /// Zero means unbounded.
    pub pool_size: usize,

    /// Parent cancellation scope. Cancelling it shuts down every task of
    /// the instance, but does not release the transport; call `close` for that.
    pub parent: Option<CancellationToken>,

    /// Transport variant to bind.
    pub network: NetworkKind,

    /// How long an inbound datagram may wait for channel capacity before
    /// it is parked for the background pump. Zero makes the attempt
    /// non-blocking.
    pub delivery_timeout: Duration,

    /// Capacity of the shared inbound channel.
    pub inbound_capacity: usize,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            address: Address::new("127.0.0.1:0"),
            timeout: Duration::from_secs(5),
            pool_size: 16,
            parent: None,
            network: NetworkKind::Stream,
            delivery_timeout: Duration::ZERO,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

impl CommunicationConfig {
    /// Create a configuration for `address` with default settings.
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Set the dial, write and read deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-peer idle pool bound.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Derive the instance's cancellation scope from `parent`.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Select the transport variant.
    pub fn with_network(mut self, network: NetworkKind) -> Self {
        self.network = network;
        self
    }

    /// Bound the immediate inbound handoff.
    pub fn with_delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    /// Set the inbound channel capacity. Values below one are raised to one.
    pub fn with_inbound_capacity(mut self, inbound_capacity: usize) -> Self {
        self.inbound_capacity = inbound_capacity.max(1);
        self
    }

    /// Configuration for a loopback endpoint on an ephemeral port.
    pub fn local() -> Self {
        Self::new("127.0.0.1:0").with_timeout(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CommunicationConfig::default();
        assert_eq!(config.inbound_capacity, DEFAULT_INBOUND_CAPACITY);
        assert_eq!(config.network, NetworkKind::Stream);
        assert!(config.delivery_timeout.is_zero());
        assert!(config.parent.is_none());
    }

    #[test]
    fn test_builders() {
        let config = CommunicationConfig::new("udp://127.0.0.1:0")
            .with_network(NetworkKind::Datagram)
            .with_pool_size(2)
            .with_timeout(Duration::ZERO)
            .with_inbound_capacity(0);
        assert_eq!(config.address.as_str(), "udp://127.0.0.1:0");
        assert_eq!(config.network, NetworkKind::Datagram);
        assert_eq!(config.pool_size, 2);
        assert!(config.timeout.is_zero());
        assert_eq!(config.inbound_capacity, 1);
    }
}
