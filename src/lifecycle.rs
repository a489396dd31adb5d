//! Lifecycle-scoped task ownership
//!
//! Every task a component spawns goes through its [`LifecycleScope`]. Tearing
//! the scope down cancels all of them together and waits for them to finish.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Cancellation token plus task tracker owned by one component
#[derive(Clone)]
pub struct LifecycleScope {
    name: String,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl LifecycleScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// A scope that is torn down with this one but can also end on its own
    pub fn child(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: self.token.child_token(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn `fut` on this scope. Returns `None` once the scope is torn down.
    pub fn launch<F>(&self, fut: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            debug!("Scope {} is closed, dropping task", self.name);
            return None;
        }

        let token = self.token.clone();
        let name = self.name.clone();
        Some(self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Task cancelled with scope {}", name);
                }
                _ = fut => {}
            }
        }))
    }

    /// Cancel every task and wait for all of them to end
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Scope {} shut down", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_cancels_tasks() {
        let scope = LifecycleScope::new("test");
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        scope.launch(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::timeout(Duration::from_secs(5), scope.shutdown())
            .await
            .expect("shutdown should not wait for the sleeping task");
        assert!(!finished.load(Ordering::SeqCst));
        assert!(!scope.is_active());
    }

    #[tokio::test]
    async fn test_launch_after_shutdown_is_refused() {
        let scope = LifecycleScope::new("test");
        scope.shutdown().await;
        assert!(scope.launch(async {}).is_none());
    }

    #[tokio::test]
    async fn test_child_scope_follows_parent() {
        let parent = LifecycleScope::new("parent");
        let child = parent.child("child");
        assert!(child.is_active());

        child.shutdown().await;
        assert!(parent.is_active());

        let child = parent.child("child-2");
        parent.shutdown().await;
        assert!(!child.is_active());
    }

    #[tokio::test]
    async fn test_completed_task_runs_to_end() {
        let scope = LifecycleScope::new("test");
        let handle = scope.launch(async {}).unwrap();
        tokio_test::assert_ok!(handle.await);
    }
}
