//! Background task supervision.
//!
//! Every long-running task of a courier instance (accept loop, listen loops,
//! receiver pumps) is spawned through a [`TaskSupervisor`]. The supervisor is
//! an explicit, clonable handle: construct it once, hand it to whatever needs
//! to spawn, and call [`TaskSupervisor::close`] during teardown. `close` only
//! returns once every task spawned before it has finished.
//!
//! # Lifecycle
//!
//! ```text
//! ┌─────────┐   close()   ┌─────────┐  all tasks done  ┌─────────┐
//! │ Working ├────────────►│ Closing ├─────────────────►│ Closed  │
//! └────┬────┘             └─────────┘                  └─────────┘
//!      │ spawn_task() → tracked
//! ```
//!
//! Spawning once closing has begun is a lifecycle bug in the caller. It is
//! reported as [`SupervisorError::Closed`] and logged at `error` level; the
//! task is never started.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::Flag;

/// Errors returned by [`TaskSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    /// The supervisor has started shutting down and accepts no new tasks.
    #[error("task supervisor is closed, refusing to spawn `{task}`")]
    Closed {
        /// Name of the task that was refused.
        task: &'static str,
    },
}

/// Shared task supervisor.
///
/// Cloning yields another handle to the same set of tracked tasks.
#[derive(Clone, Debug)]
pub struct TaskSupervisor {
    inner: Arc<SupervisorInner>,
}

#[derive(Debug)]
struct SupervisorInner {
    tracker: TaskTracker,
    state: Flag,
    /// Spawns hold the read side while checking `state`; `close` takes the
    /// write side to flip it, so no spawn can slip in after the flip.
    gate: RwLock<()>,
}

impl TaskSupervisor {
    /// Create a supervisor in the working state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                tracker: TaskTracker::new(),
                state: Flag::new(),
                gate: RwLock::new(()),
            }),
        }
    }

    /// Spawn a tracked task on the current tokio runtime.
    ///
    /// The task runs inside a `supervised` span carrying `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Closed`] once [`close`](Self::close) has
    /// been called.
    pub fn spawn_task<F>(&self, name: &'static str, future: F) -> Result<(), SupervisorError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _gate = self.inner.gate.read().unwrap_or_else(PoisonError::into_inner);
        if self.inner.state.is_inactive() {
            tracing::error!(task = name, "spawn requested after task supervisor closed");
            return Err(SupervisorError::Closed { task: name });
        }

        tracing::trace!(task = name, "spawning supervised task");
        self.inner
            .tracker
            .spawn(future.instrument(tracing::debug_span!("supervised", task = name)));
        Ok(())
    }

    /// Stop accepting tasks and wait for every tracked task to finish.
    ///
    /// Safe to call more than once; later calls wait as well.
    pub async fn close(&self) {
        {
            let _gate = self.inner.gate.write().unwrap_or_else(PoisonError::into_inner);
            if self.inner.state.inactivate() {
                tracing::debug!(
                    in_flight = self.inner.tracker.len(),
                    "task supervisor closing"
                );
            }
            self.inner.tracker.close();
        }

        self.inner.tracker.wait().await;
        tracing::debug!("task supervisor drained");
    }

    /// Number of tracked tasks that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.inner.state.is_inactive()
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
