// Task supervision: one root cancellation token plus a tracker that owns
// every spawned client and media task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::SimError;

#[derive(Clone, Default)]
pub struct TaskSupervisor {
    root: CancellationToken,
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token. Cancelling it stops every supervised task.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(task)
    }

    /// Number of supervised tasks still running.
    pub fn task_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn cancel(&self) {
        self.root.cancel();
    }

    pub async fn cancelled(&self) {
        self.root.cancelled().await
    }

    /// Cancel everything, stop accepting new tasks and join them all within `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SimError> {
        self.root.cancel();
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .map_err(|_| SimError::ShutdownTimeout)
    }
}

/// Sleep for `duration` unless `token` fires first. Returns `true` if the
/// full duration elapsed.
pub async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
