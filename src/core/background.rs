//! Background worker loops that feed queued runs to the scheduler.
//!
//! Workers share nothing but the database; two loops racing for the same
//! run are arbitrated by the atomic claim.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::scheduler::RunScheduler;

/// Longest `stop` waits for workers before aborting them
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct BackgroundLoop {
    scheduler: Arc<RunScheduler>,
    batch_size: usize,
    poll_interval: Duration,
    workers: usize,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundLoop {
    pub fn new(
        scheduler: Arc<RunScheduler>,
        batch_size: usize,
        poll_interval: Duration,
        workers: usize,
    ) -> Self {
        Self {
            scheduler,
            batch_size,
            poll_interval,
            workers: workers.max(1),
            shutdown: None,
            tasks: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawn the worker tasks; a second call while running does nothing
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Background loop already running");
            return;
        }

        let (tx, rx) = watch::channel(false);
        for worker in 0..self.workers {
            self.tasks.push(tokio::spawn(worker_loop(
                worker,
                Arc::clone(&self.scheduler),
                self.batch_size,
                self.poll_interval,
                rx.clone(),
            )));
        }
        self.shutdown = Some(tx);

        info!(
            workers = self.workers,
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "Background loop started"
        );
    }

    /// Signal shutdown and wait for workers, aborting any that outlast
    /// the grace period. A run being executed at that moment is left as is.
    pub async fn stop(&mut self) {
        self.stop_within(SHUTDOWN_GRACE).await;
    }

    pub async fn stop_within(&mut self, grace: Duration) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        // Receivers may already be gone
        let _ = tx.send(true);

        let deadline = Instant::now() + grace;
        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("Worker did not stop in time; aborting");
                task.abort();
            }
        }

        info!("Background loop stopped");
    }
}

async fn worker_loop(
    worker: usize,
    scheduler: Arc<RunScheduler>,
    batch_size: usize,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let iteration = AssertUnwindSafe(scheduler.process_queued_runs(batch_size))
            .catch_unwind()
            .await;
        match iteration {
            Ok(0) => {}
            Ok(completed) => debug!(worker, completed, "Batch processed"),
            Err(_) => error!(worker, "Worker iteration panicked; continuing"),
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(worker, "Worker stopped");
}
