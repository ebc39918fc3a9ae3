//! Pool orchestration
//!
//! The pool owns both channels and the report under construction. A run
//! enqueues every batch, spawns the workers, drains exactly one result per
//! batch, then sends one stop sentinel per worker and joins them.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::batch::config::PoolConfig;
use crate::batch::executor::{Worker, WorkerMessage};
use crate::batch::types::TaskBatch;
use crate::metrics::MetricsCollector;
use crate::report::{format_elapsed, PoolReport};
use crate::{PoolError, Result};

/// Callback for progress updates: `(completed, total)`
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Handle for cancelling a pool's runs from another task.
///
/// After cancellation, tasks that have not started are recorded as
/// cancelled and running tasks are abandoned. Every submitted batch still
/// appears in the report.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Clear a previous cancellation so the pool can run again
    pub fn reset(&self) {
        self.sender.send_replace(false);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Worker pool for running task batches in parallel
pub struct Pool {
    config: PoolConfig,
    progress_callback: Option<Arc<ProgressCallback>>,
    cancel: CancelHandle,
    metrics: MetricsCollector,
}

impl Pool {
    /// Create a pool with the given configuration
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            progress_callback: None,
            cancel: CancelHandle::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Create a pool with `workers` workers and otherwise default settings
    pub fn with_workers(workers: usize) -> Self {
        Self::new(PoolConfig::default().with_workers(workers))
    }

    /// Set progress callback, invoked after each collected batch result
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Handle that cancels this pool's runs
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run every batch and return the report once all of them have finished.
    ///
    /// Fails only on structural misuse (no batches, zero workers) or if the
    /// workers disappear before reporting back. Task failures are recorded
    /// in the report.
    #[instrument(skip(self, batches), fields(batch_count = batches.len(), workers = self.config.workers))]
    pub async fn run<A, R>(&self, batches: Vec<TaskBatch<A, R>>) -> Result<PoolReport<A, R>>
    where
        A: Clone + Send + Sync + 'static,
        R: Send + 'static,
    {
        if batches.is_empty() {
            return Err(PoolError::NoBatches);
        }
        let workers = self.config.workers;
        if workers == 0 {
            return Err(PoolError::InvalidWorkerCount(workers));
        }

        let total = batches.len();
        info!(batches = total, workers = workers, task_timeout = ?self.config.task_timeout, "Starting pool");

        let (input_tx, input_rx) = mpsc::unbounded_channel::<WorkerMessage<A, R>>();
        let (output_tx, mut output_rx) = mpsc::unbounded_channel();
        let input_rx = Arc::new(Mutex::new(input_rx));
        let mut report = PoolReport::new(workers);

        let start = Instant::now();
        for batch in batches {
            debug!(batch = %batch.label(), tasks = batch.len(), "Enqueueing batch");
            input_tx
                .send(WorkerMessage::Batch(batch))
                .map_err(|_| PoolError::ChannelClosed { received: 0, expected: total })?;
        }

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&input_rx),
                    output_tx.clone(),
                    self.config.task_timeout,
                    self.cancel.subscribe(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        // Workers hold the only senders, so the drain ends if they all die
        drop(output_tx);

        for completed in 1..=total {
            let Some(result) = output_rx.recv().await else {
                error!(received = completed - 1, expected = total, "Result channel closed early");
                for joined in join_all(handles).await {
                    joined?;
                }
                return Err(PoolError::ChannelClosed { received: completed - 1, expected: total });
            };

            if result.has_error() {
                warn!(batch = %result.label(), elapsed = %format_elapsed(result.elapsed()), "Batch finished with error");
            } else {
                info!(batch = %result.label(), elapsed = %format_elapsed(result.elapsed()), "Batch finished");
            }
            report.record(result);

            if let Some(callback) = &self.progress_callback {
                callback(completed, total);
            }
        }
        report.set_total_elapsed(start.elapsed());

        for _ in 0..workers {
            // Workers may already be gone if their input closed; nothing to stop then
            let _ = input_tx.send(WorkerMessage::Stop);
        }
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Worker join error after all results were collected");
            }
        }

        self.metrics.record_pool_run(report.has_errors());
        if report.has_errors() {
            warn!(
                batches = report.batch_count(),
                errors = report.error_count(),
                elapsed = %format_elapsed(report.total_elapsed()),
                "Pool done with errors"
            );
        } else {
            info!(
                batches = report.batch_count(),
                elapsed = %format_elapsed(report.total_elapsed()),
                "Pool done"
            );
        }

        Ok(report)
    }

    /// Run every batch, then save the report to `path`
    pub async fn run_and_save<A, R>(
        &self,
        batches: Vec<TaskBatch<A, R>>,
        path: impl AsRef<Path>,
    ) -> Result<PoolReport<A, R>>
    where
        A: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
        R: Send + Serialize + DeserializeOwned + 'static,
    {
        let report = self.run(batches).await?;
        report.save(path).await?;
        Ok(report)
    }
}

/// Run `batches` on `workers` workers with default settings
pub async fn run_pool<A, R>(batches: Vec<TaskBatch<A, R>>, workers: usize) -> Result<PoolReport<A, R>>
where
    A: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    Pool::with_workers(workers).run(batches).await
}
