//! Detached session writes.
//!
//! Writes that must not block the response are spawned onto a
//! [`TaskTracker`]. Their failures never reach the caller; they are logged at
//! `error` and counted so an operator can see them. Shutdown drains the
//! tracker so a write in flight is either stored or counted as failed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use parley_types::chat::{MessageRole, SessionScope};

use crate::session::store::SessionStore;

/// Counters for background writes, shared by every turn.
#[derive(Debug, Default)]
pub struct BackgroundWrites {
    spawned: AtomicU64,
    failed: AtomicU64,
    tasks: TaskTracker,
}

impl BackgroundWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total background writes started.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Background writes that returned an error (or whose task died).
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Writes still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait up to `timeout` for every write in flight to finish.
    ///
    /// Writes still running at the deadline are counted as failed. Returns
    /// `true` when nothing was left behind.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tasks.close();
        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => {
                info!(spawned = self.spawned(), failed = self.failed(), "Background writes drained");
                true
            }
            Err(_) => {
                let abandoned = self.tasks.len() as u64;
                self.failed.fetch_add(abandoned, Ordering::Relaxed);
                error!(
                    abandoned,
                    timeout_ms = timeout.as_millis() as u64,
                    "Background writes still running at shutdown"
                );
                false
            }
        }
    }

    /// Spawn `append_message` as a tracked task.
    pub fn spawn_append<S>(
        self: &Arc<Self>,
        store: Arc<S>,
        scope: SessionScope,
        role: MessageRole,
        content: String,
    ) -> PendingWrite
    where
        S: SessionStore + 'static,
    {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        let tracker = Arc::clone(self);
        let handle = self.tasks.spawn(async move {
            let started = Instant::now();
            match store.append_message(&scope, role, &content).await {
                Ok(()) => {
                    debug!(
                        scope = %scope,
                        role = %role,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Background append completed"
                    );
                    true
                }
                Err(e) => {
                    tracker.failed.fetch_add(1, Ordering::Relaxed);
                    error!(scope = %scope, role = %role, error = %e, "Background append failed");
                    false
                }
            }
        });
        PendingWrite {
            handle,
            tracker: Arc::clone(self),
        }
    }
}

/// Handle to a write already in flight.
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    handle: JoinHandle<bool>,
    tracker: Arc<BackgroundWrites>,
}

impl PendingWrite {
    /// Wait for the write to finish. Returns `true` if it was stored.
    pub async fn wait(self) -> bool {
        match self.handle.await {
            Ok(stored) => stored,
            Err(e) => {
                self.tracker.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Background append task did not complete");
                false
            }
        }
    }
}
