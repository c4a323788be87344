//! Task registry for site background work.
//!
//! Every long-running task receives the registry's shutdown signal. Shutdown
//! flips the signal and waits for tasks to return on their own; only tasks
//! still running after the grace period are aborted.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Time tasks get to finish after shutdown is signalled
pub const DEFAULT_GRACE: Duration = Duration::from_secs(10);

/// Tracks the background tasks of one site.
#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TaskRegistry {
    /// Registry with the shutdown signal lowered
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Receiver that turns true on shutdown
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Whether shutdown has been signalled
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Spawn a task that watches the shutdown signal itself
    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Spawning task");
        let handle = tokio::spawn(fut);
        self.handles.lock().push((name, handle));
    }

    /// Number of tasks not yet reaped
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether no task is registered
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Signal shutdown and wait up to `grace` for every task.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + grace;

        for (name, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
                Err(_) => {
                    tracing::warn!(task = name, "Task ignored shutdown, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for (_, handle) in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_lets_tasks_finish() {
        let registry = TaskRegistry::new();
        let finished = Arc::new(AtomicBool::new(false));

        let mut signal = registry.shutdown_signal();
        let flag = finished.clone();
        registry.spawn("worker", async move {
            while !*signal.borrow() {
                if signal.changed().await.is_err() {
                    break;
                }
            }
            flag.store(true, Ordering::SeqCst);
        });

        registry.shutdown(Duration::from_secs(1)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(registry.is_empty());
        assert!(registry.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_aborted_after_grace() {
        let registry = TaskRegistry::new();
        registry.spawn("stuck", std::future::pending());

        registry.shutdown(Duration::from_millis(50)).await;
        assert!(registry.is_empty());
    }
}
