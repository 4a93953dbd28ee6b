//! Shutdown coordination for the server.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Coordinator for graceful shutdown.
///
/// Holds the single "done" token every long-running task subscribes to, and
/// the counter of outstanding background tasks. Triggering is exactly-once:
/// only the first call to [`Shutdown::trigger`] has an effect.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
    tracker: TaskTracker,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown is triggered.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal. Returns `true` for the call that actually
    /// triggered it.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Resolve once shutdown has been triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// Spawn a task that shutdown will wait for.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of tracked tasks still running.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every tracked task has finished.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_exactly_once() {
        let shutdown = Shutdown::new();
        let token = shutdown.subscribe();

        assert!(!token.is_cancelled());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn wait_covers_spawned_tasks() {
        let shutdown = Shutdown::new();
        let token = shutdown.subscribe();

        shutdown.spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert_eq!(shutdown.outstanding(), 1);

        shutdown.trigger();
        shutdown.wait().await;
        assert_eq!(shutdown.outstanding(), 0);
    }
}
