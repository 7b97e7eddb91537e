//! Best-effort delivery of inbound datagrams.
//!
//! Every inbound connection owns one [`Receiver`]. The listen loop hands it
//! each decoded [`Datagram`] through [`Receiver::add_response`], which tries
//! to pass the datagram straight to the shared inbound channel. When the
//! channel is full the datagram is parked in a FIFO [`Queue`] and
//! [`Receiver::start`] (the pump) delivers it as soon as the consumer frees
//! capacity.
//!
//! A parked datagram can be overtaken by a later one that finds free
//! capacity immediately, so ordering is best-effort under backpressure.
//! Nothing is dropped while the receiver is alive.

use std::time::Duration;

use courier_core::Queue;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::Datagram;

/// Delivery pipeline for one inbound connection.
#[derive(Debug)]
pub struct Receiver {
    pending: Queue<Datagram>,
    inbound: mpsc::Sender<Datagram>,
    delivery_timeout: Duration,
    /// Cancelled by [`close`](Self::close) or by the owner's shutdown.
    token: CancellationToken,
    /// Cancelled by [`finish`](Self::finish): drain, then stop.
    finished: CancellationToken,
}

impl Receiver {
    /// Create a receiver feeding `inbound`.
    ///
    /// A zero `delivery_timeout` makes every immediate handoff attempt
    /// non-blocking.
    pub fn new(
        inbound: mpsc::Sender<Datagram>,
        delivery_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            pending: Queue::new(),
            inbound,
            delivery_timeout,
            token,
            finished: CancellationToken::new(),
        }
    }

    /// Number of datagrams waiting for the pump.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Deliver `datagram`, parking it for the pump if the consumer is busy.
    pub async fn add_response(&self, datagram: Datagram) {
        if let Err(datagram) = self.try_deliver(datagram).await {
            tracing::trace!("Receiver: consumer busy, queueing datagram from {}", datagram.from);
            self.pending.append(datagram);
        }
    }

    /// One handoff attempt. Gives the datagram back if it was not taken.
    ///
    /// After cancellation, or once the consumer side is gone, the attempt
    /// counts as delivered and the datagram is discarded.
    async fn try_deliver(&self, datagram: Datagram) -> Result<(), Datagram> {
        if self.token.is_cancelled() {
            return Ok(());
        }

        if self.delivery_timeout.is_zero() {
            return match self.inbound.try_send(datagram) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(datagram)) => Err(datagram),
                Err(TrySendError::Closed(_)) => Ok(()),
            };
        }

        let reserved = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Ok(()),
            reserved = tokio::time::timeout(self.delivery_timeout, self.inbound.reserve()) => reserved,
        };
        match reserved {
            Ok(Ok(permit)) => {
                permit.send(datagram);
                Ok(())
            }
            Ok(Err(_)) => Ok(()),
            Err(_) => Err(datagram),
        }
    }

    /// Run the pump until cancelled, or until finished and drained.
    ///
    /// The queue head is popped only once channel capacity is reserved for
    /// it, so an interrupted wait never loses a datagram.
    pub async fn start(&self) {
        loop {
            if self.pending.is_empty() {
                if self.finished.is_cancelled() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break,
                    _ = self.finished.cancelled() => continue,
                    _ = self.pending.notified() => continue,
                }
            }

            let reserved = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                reserved = self.inbound.reserve() => reserved,
            };
            match reserved {
                Ok(permit) => {
                    if let Some(datagram) = self.pending.pop() {
                        permit.send(datagram);
                    }
                }
                Err(_) => {
                    let dropped = self.pending.clear();
                    tracing::debug!("Receiver: inbound channel closed, dropped {} datagrams", dropped);
                    break;
                }
            }
        }

        if self.token.is_cancelled() {
            let dropped = self.pending.clear();
            if dropped > 0 {
                tracing::debug!("Receiver: closed with {} undelivered datagrams", dropped);
            }
        }
    }

    /// Let the pump drain what is queued and then stop.
    pub fn finish(&self) {
        self.finished.cancel();
    }

    /// Stop the pump. Queued datagrams are discarded.
    pub fn close(&self) {
        self.token.cancel();
    }
}
