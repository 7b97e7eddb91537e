//! Shared handle to the inbound channel.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::Mutex;

use crate::Datagram;

/// Consumer side of the single inbound channel of a
/// [`Communication`](crate::Communication).
///
/// Every clone reads from the same channel; each datagram is seen by
/// exactly one reader.
#[derive(Clone, Debug)]
pub struct Inbound {
    rx: Arc<Mutex<mpsc::Receiver<Datagram>>>,
}

impl Inbound {
    pub(crate) fn new(rx: mpsc::Receiver<Datagram>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next datagram.
    ///
    /// Returns `None` once the owning instance has been closed and every
    /// buffered datagram was consumed.
    pub async fn recv(&self) -> Option<Datagram> {
        self.rx.lock().await.recv().await
    }

    /// Take the next datagram if one is ready.
    ///
    /// Reports [`TryRecvError::Empty`] while another clone is inside `recv`.
    pub fn try_recv(&self) -> Result<Datagram, TryRecvError> {
        match self.rx.try_lock() {
            Ok(mut rx) => rx.try_recv(),
            Err(_) => Err(TryRecvError::Empty),
        }
    }
}
