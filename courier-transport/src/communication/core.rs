//! Core communication implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use courier_core::{Flag, TaskSupervisor};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::config::CommunicationConfig;
use super::inbound::Inbound;
use crate::error::{CommunicationError, CommunicationResult};
use crate::transport::RawConnection;
use crate::{Address, Connection, Datagram, Receiver, Transport, TransportError};

/// First backoff delay of the accept loop.
pub(crate) const MIN_POLL_DELAY: Duration = Duration::from_millis(5);

/// Backoff ceiling of the accept loop.
pub(crate) const MAX_POLL_DELAY: Duration = Duration::from_millis(500);

/// A bound communication endpoint.
///
/// Cheap to clone; every clone drives the same endpoint.
///
/// # Example
///
/// ```no_run
/// use courier_transport::{Communication, CommunicationConfig};
///
/// # async fn demo() -> Result<(), courier_transport::CommunicationError> {
/// let a = Communication::bind(CommunicationConfig::local()).await?;
/// let b = Communication::bind(CommunicationConfig::local()).await?;
/// a.start()?;
///
/// b.send(a.addr(), b"hello").await?;
/// let datagram = a.receive().recv().await;
/// assert_eq!(datagram.map(|d| d.payload), Some(b"hello".to_vec()));
///
/// b.close().await?;
/// a.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Communication {
    inner: Arc<CommunicationInner>,
}

#[derive(Debug)]
struct CommunicationInner {
    config: CommunicationConfig,
    state: Flag,
    transport: Transport,

    /// Idle outbound connections per peer; the most recently returned one is last.
    pool: Mutex<HashMap<Address, Vec<Connection>>>,

    /// Instance scope, derived from the configured parent.
    token: CancellationToken,
    supervisor: TaskSupervisor,

    /// Original sender of the inbound channel. Dropped on close so readers
    /// see end-of-stream once every receiver pump is gone.
    inbound_tx: std::sync::Mutex<Option<mpsc::Sender<Datagram>>>,
    inbound: Inbound,

    started: AtomicBool,
    /// Cancelled when the accept loop returns.
    accept_stopped: CancellationToken,
}

impl Communication {
    /// Bind a new endpoint with its own task supervisor.
    ///
    /// # Errors
    ///
    /// Address validation and socket errors from [`Transport::bind`].
    pub async fn bind(config: CommunicationConfig) -> CommunicationResult<Self> {
        Self::with_supervisor(config, TaskSupervisor::new()).await
    }

    /// Bind a new endpoint whose background tasks run under `supervisor`.
    ///
    /// The supervisor is closed together with the endpoint.
    pub async fn with_supervisor(
        config: CommunicationConfig,
        supervisor: TaskSupervisor,
    ) -> CommunicationResult<Self> {
        let transport = Transport::bind(config.network, &config.address).await?;
        let token = match &config.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (tx, rx) = mpsc::channel(config.inbound_capacity.max(1));

        tracing::info!(
            "Communication bound to {} ({})",
            transport.local_address(),
            transport.kind()
        );

        Ok(Self {
            inner: Arc::new(CommunicationInner {
                config,
                state: Flag::new(),
                transport,
                pool: Mutex::new(HashMap::new()),
                token,
                supervisor,
                inbound_tx: std::sync::Mutex::new(Some(tx)),
                inbound: Inbound::new(rx),
                started: AtomicBool::new(false),
                accept_stopped: CancellationToken::new(),
            }),
        })
    }

    /// Spawn the accept loop. Does nothing if already started or closed.
    ///
    /// # Errors
    ///
    /// [`CommunicationError::Supervisor`] if the supervisor was closed
    /// from elsewhere.
    pub fn start(&self) -> CommunicationResult<()> {
        if self.inner.state.is_inactive() || self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let inner = self.inner.clone();
        if let Err(e) = self
            .inner
            .supervisor
            .spawn_task("accept_loop", inner.accept_loop())
        {
            self.inner.started.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(())
    }

    /// Write `payload` to the peer at `address` as one frame.
    ///
    /// Reuses the most recently returned idle connection for `address`, or
    /// dials a new one. A connection that fails to write is closed and never
    /// returned to the pool.
    ///
    /// # Errors
    ///
    /// - [`CommunicationError::AlreadyClosed`] after [`close`](Self::close) or
    ///   parent cancellation, without touching the network
    /// - [`CommunicationError::Transport`] if dialing failed
    /// - [`CommunicationError::Connection`] if the write failed
    pub async fn send(&self, address: &Address, payload: &[u8]) -> CommunicationResult<()> {
        let inner = &self.inner;
        if inner.state.is_inactive() || inner.token.is_cancelled() {
            return Err(CommunicationError::AlreadyClosed);
        }

        let connection = match inner.checkout(address).await {
            Some(connection) => connection,
            None => inner.dial(address).await?,
        };

        if let Err(e) = connection.write(payload).await {
            tracing::debug!("Communication: write to {} failed: {}", address, e);
            if let Err(close_error) = connection.close().await {
                tracing::debug!(
                    "Communication: closing failed connection to {}: {}",
                    address,
                    close_error
                );
            }
            return Err(e.into());
        }

        inner.release(address, connection).await;
        Ok(())
    }

    /// Handle to the shared inbound channel. Always the same channel.
    pub fn receive(&self) -> Inbound {
        self.inner.inbound.clone()
    }

    /// Shut the endpoint down. Idempotent.
    ///
    /// Closes pooled connections and the transport, waits for the accept
    /// loop and every supervised task, then ends the inbound channel.
    /// Datagrams still parked in receivers are discarded.
    ///
    /// # Errors
    ///
    /// The first failure closing a pooled connection (remaining pooled
    /// connections are then dropped unclosed) or the transport. Shutdown of
    /// the background tasks completes regardless.
    pub async fn close(&self) -> CommunicationResult<()> {
        let inner = &self.inner;
        if !inner.state.inactivate() {
            return Ok(());
        }

        tracing::debug!("Communication {} closing", inner.transport.local_address());
        inner.token.cancel();

        let mut result = inner.close_pool().await;
        if let Err(e) = inner.transport.close() {
            if result.is_ok() {
                result = Err(e.into());
            }
        }

        if inner.started.load(Ordering::Acquire) {
            inner.accept_stopped.cancelled().await;
        }
        inner.supervisor.close().await;
        inner
            .inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        tracing::info!("Communication {} closed", inner.transport.local_address());
        result
    }

    /// Resolved local address peers should send to.
    pub fn addr(&self) -> &Address {
        self.inner.transport.local_address()
    }

    /// Number of idle pooled connections to `address`.
    pub async fn idle_connections(&self, address: &Address) -> usize {
        self.inner
            .pool
            .lock()
            .await
            .get(address)
            .map_or(0, Vec::len)
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_inactive()
    }

    /// Supervisor running this endpoint's background tasks.
    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.supervisor
    }
}

impl CommunicationInner {
    /// Accept inbound connections until the transport closes or the scope
    /// is cancelled, backing off between iterations.
    async fn accept_loop(self: Arc<Self>) {
        let mut delay = MIN_POLL_DELAY;
        loop {
            delay = (delay * 2).min(MAX_POLL_DELAY);

            let accepted = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                accepted = self.transport.accept() => accepted,
            };

            match accepted {
                Ok(raw) => {
                    delay = MIN_POLL_DELAY;
                    self.handle_incoming(raw).await;
                }
                Err(TransportError::Closed) => {
                    tracing::debug!(
                        "Communication {}: transport closed, stopping accept loop",
                        self.transport.local_address()
                    );
                    self.token.cancel();
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        "Communication {}: accept failed: {}, retrying in {:?}",
                        self.transport.local_address(),
                        e,
                        delay
                    );
                }
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.accept_stopped.cancel();
    }

    /// Wire an accepted connection to a receiver and spawn both loops.
    async fn handle_incoming(&self, raw: RawConnection) {
        let Some(inbound) = self.inbound_sender() else {
            return;
        };

        let local = self.transport.local_address().clone();
        let connection = Arc::new(Connection::inbound(
            raw,
            local,
            self.config.timeout,
            self.token.child_token(),
        ));
        let receiver = Arc::new(Receiver::new(
            inbound,
            self.config.delivery_timeout,
            self.token.child_token(),
        ));
        tracing::debug!(
            "Communication {}: accepted connection from {:?}",
            connection.local(),
            connection.peer()
        );

        let pump = {
            let receiver = receiver.clone();
            async move { receiver.start().await }
        };
        if let Err(e) = self.supervisor.spawn_task("receiver", pump) {
            tracing::warn!("Communication: dropping accepted connection: {}", e);
            close_quietly(&connection).await;
            return;
        }

        let listen = {
            let connection = connection.clone();
            let receiver = receiver.clone();
            async move {
                connection.listen(&receiver).await;
                close_quietly(&connection).await;
                receiver.finish();
            }
        };
        if let Err(e) = self.supervisor.spawn_task("listen", listen) {
            tracing::warn!("Communication: dropping accepted connection: {}", e);
            receiver.close();
            close_quietly(&connection).await;
        }
    }

    fn inbound_sender(&self) -> Option<mpsc::Sender<Datagram>> {
        self.inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pop the most recently returned open connection to `address`.
    async fn checkout(&self, address: &Address) -> Option<Connection> {
        let mut pool = self.pool.lock().await;
        let idle = pool.get_mut(address)?;
        while let Some(connection) = idle.pop() {
            if !connection.is_closed() {
                return Some(connection);
            }
        }
        None
    }

    /// Dial `address` and announce our listening address on the new stream.
    async fn dial(&self, address: &Address) -> CommunicationResult<Connection> {
        let raw = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(CommunicationError::AlreadyClosed),
            raw = self.transport.dial(address, self.config.timeout) => raw?,
        };

        let source = raw.local_address();
        let local = self.transport.local_address();
        let connection = Connection::outbound(
            raw,
            address.clone(),
            local.clone(),
            self.config.timeout,
            self.token.child_token(),
        );
        if let Err(e) = connection.announce(local).await {
            close_quietly(&connection).await;
            return Err(e.into());
        }

        tracing::debug!("Communication {}: dialed {} from {:?}", local, address, source);
        Ok(connection)
    }

    /// Return `connection` to the pool, or close it if the pool is full or
    /// the endpoint is closing.
    ///
    /// Hands back the connection when it was closed instead of pooled.
    async fn release(&self, address: &Address, connection: Connection) -> Option<Connection> {
        let mut pool = self.pool.lock().await;
        let idle = pool.entry(address.clone()).or_default();
        let pool_size = self.config.pool_size;
        if self.state.is_active() && (pool_size == 0 || idle.len() < pool_size) {
            idle.push(connection);
            return None;
        }
        drop(pool);

        tracing::trace!("Communication: pool for {} full, closing connection", address);
        close_quietly(&connection).await;
        Some(connection)
    }

    /// Close every pooled connection. Stops at the first failure.
    async fn close_pool(&self) -> CommunicationResult<()> {
        let mut pool = self.pool.lock().await;
        for (address, idle) in pool.drain() {
            for connection in idle {
                if let Err(e) = connection.close().await {
                    tracing::warn!(
                        "Communication: closing pooled connection to {} failed: {}",
                        address,
                        e
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

async fn close_quietly(connection: &Connection) {
    if let Err(e) = connection.close().await {
        tracing::debug!("Communication: closing connection failed: {}", e);
    }
}
