//! Pipeline shutdown coordination
//!
//! A single watch channel fans the stop flag out to every stage worker and
//! the reaper. Workers finish the job they hold before exiting, so the
//! drain joins their handles one by one against a shared deadline. A worker
//! that misses the deadline is abandoned rather than cancelled mid-write:
//! whatever document it held is still in its stage column, and the reaper
//! re-enqueues it on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::constants::SHUTDOWN_TIMEOUT_SECS;

/// A worker task tracked under the stage it serves.
struct Registered {
    label: String,
    handle: JoinHandle<()>,
}

/// Owns the stop flag and the registry of drainable worker tasks.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    registry: Arc<Mutex<Vec<Registered>>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            registry: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Track a worker task under a stage-scoped label (`"chunk/1"`,
    /// `"reaper"`). The label names the straggler if the drain deadline
    /// passes.
    pub async fn register(&self, label: impl Into<String>, handle: JoinHandle<()>) {
        self.registry.lock().await.push(Registered {
            label: label.into(),
            handle,
        });
    }

    /// A receiver for worker loops to poll between jobs.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Flip the stop flag. Workers observe it after their current job.
    pub fn request_stop(&self) {
        let _ = self.tx.send(true);
    }

    pub fn stop_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the stop flag flips.
    pub fn wait_for_stop(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let _ = rx.wait_for(|&stop| stop).await;
        }
    }

    /// Stop and drain: every registered worker shares one deadline to
    /// finish its in-flight job and exit its loop.
    ///
    /// The pool must stay open until this returns so late processing-log
    /// writes and stage transitions still land; the caller closes it after.
    pub async fn drain(&self) {
        self.request_stop();

        let workers = std::mem::take(&mut *self.registry.lock().await);
        if workers.is_empty() {
            return;
        }

        tracing::info!(
            workers = workers.len(),
            timeout_secs = SHUTDOWN_TIMEOUT_SECS,
            "Draining pipeline workers"
        );

        let deadline = Instant::now() + Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        let mut abandoned = 0usize;
        for worker in workers {
            let left = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(left, worker.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(worker = %worker.label, error = %e, "Worker panicked before the drain");
                }
                Err(_) => {
                    abandoned += 1;
                    tracing::warn!(
                        worker = %worker.label,
                        "Worker still busy at the drain deadline; its document stays in its stage column for the reaper"
                    );
                }
            }
        }

        if abandoned == 0 {
            tracing::debug!("All workers drained");
        } else {
            tracing::warn!(abandoned, "Drain deadline passed with workers still running");
        }
    }

    /// Flip the stop flag when the process receives SIGINT or SIGTERM.
    pub fn listen_for_signals(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let signal = stop_signal().await;
            tracing::info!(signal, "Stop signal received; finishing in-flight jobs");
            let _ = tx.send(true);
        });
    }
}

async fn stop_signal() -> &'static str {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("SIGTERM handler installation failed");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_flag_lifecycle() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.stop_requested());

        coordinator.request_stop();

        assert!(coordinator.stop_requested());
        assert!(*coordinator.subscribe().borrow());
    }

    #[tokio::test]
    async fn test_wait_for_stop_unblocks_on_request() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = tokio::spawn(coordinator.wait_for_stop());

        tokio::task::yield_now().await;
        coordinator.request_stop();

        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_drain_joins_workers_that_honor_the_flag() {
        let coordinator = ShutdownCoordinator::new();
        for label in ["chunk/0", "embed/0", "reaper"] {
            let mut rx = coordinator.subscribe();
            coordinator
                .register(
                    label,
                    tokio::spawn(async move {
                        let _ = rx.wait_for(|&stop| stop).await;
                    }),
                )
                .await;
        }

        coordinator.drain().await;

        assert!(coordinator.stop_requested());
        assert!(coordinator.registry.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_abandons_worker_stuck_past_deadline() {
        let coordinator = ShutdownCoordinator::new();
        // A worker that ignores the stop flag entirely. The paused clock
        // lets the drain deadline elapse without real waiting.
        coordinator
            .register("crawl/0", tokio::spawn(std::future::pending::<()>()))
            .await;

        coordinator.drain().await;

        assert!(coordinator.stop_requested());
        assert!(coordinator.registry.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_with_no_workers_is_a_noop() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.drain().await;
        assert!(coordinator.stop_requested());
    }
}
