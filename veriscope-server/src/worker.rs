//! Process-wide worker pool.
//!
//! The HTTP layer enqueues a `RunSession` message and returns; workers
//! drain the bounded queue and drive the planner. This decouples session
//! lifetime from request lifetime and keeps one logical task per session.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;
use veriscope_core::PlannerAgent;

/// Job message: drive one session to a terminal status.
#[derive(Debug, Clone, Copy)]
pub struct RunSession {
    pub session_id: Uuid,
}

/// Handle to the pool: a cloneable sender plus the worker tasks.
pub struct WorkerPool {
    tx: mpsc::Sender<RunSession>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks sharing one bounded queue.
    pub fn spawn(planner: Arc<PlannerAgent>, workers: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RunSession>(queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let planner = Arc::clone(&planner);
                tokio::spawn(async move {
                    loop {
                        let job = {
                            let mut rx = rx.lock().await;
                            rx.recv().await
                        };
                        let Some(job) = job else {
                            info!(worker_id, "job queue closed; worker exiting");
                            break;
                        };
                        info!(worker_id, session_id = %job.session_id, "worker picked up session");
                        if let Err(e) = planner.run(job.session_id).await {
                            error!(
                                worker_id,
                                session_id = %job.session_id,
                                error = %e,
                                "session run failed"
                            );
                        }
                    }
                })
            })
            .collect();

        Self { tx, handles }
    }

    /// Sender for the HTTP layer.
    pub fn sender(&self) -> mpsc::Sender<RunSession> {
        self.tx.clone()
    }

    /// Close the queue and wait for workers to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
