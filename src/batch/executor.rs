//! Worker execution loop
//!
//! Each worker pulls batches from the shared input channel, runs every task
//! of a batch in order and sends one [`BatchResult`] back per batch:
//! - each task runs on the blocking thread pool and is timed individually
//! - the first failing task ends its batch (fail-fast within a batch)
//! - failures, panics, deadlines and cancellation are captured as data
//! - the worker stops when it receives the stop sentinel

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, instrument, warn};

use crate::batch::types::{BatchResult, Task, TaskBatch, TaskError, TaskResult};
use crate::metrics::MetricsCollector;

/// Message on the input channel
pub(crate) enum WorkerMessage<A, R> {
    /// A batch to execute
    Batch(TaskBatch<A, R>),
    /// Stop sentinel
    Stop,
}

pub(crate) type SharedReceiver<A, R> = Arc<Mutex<mpsc::UnboundedReceiver<WorkerMessage<A, R>>>>;

/// A worker bound to the pool's input and output channels
pub(crate) struct Worker<A, R> {
    id: usize,
    input: SharedReceiver<A, R>,
    output: mpsc::UnboundedSender<BatchResult<A, R>>,
    task_timeout: Option<Duration>,
    cancel: watch::Receiver<bool>,
    metrics: MetricsCollector,
}

impl<A, R> Worker<A, R>
where
    A: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(
        id: usize,
        input: SharedReceiver<A, R>,
        output: mpsc::UnboundedSender<BatchResult<A, R>>,
        task_timeout: Option<Duration>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            input,
            output,
            task_timeout,
            cancel,
            metrics: MetricsCollector::new(),
        }
    }

    /// Run until a stop sentinel arrives or the input channel closes
    pub(crate) async fn run(self) {
        debug!(worker = self.id, "Worker started");
        self.metrics.worker_started();

        loop {
            // Only hold the lock while waiting for the next message
            let message = {
                let mut input = self.input.lock().await;
                input.recv().await
            };

            match message {
                Some(WorkerMessage::Batch(batch)) => {
                    let result = execute_batch(batch, self.task_timeout, &self.cancel).await;
                    self.metrics.record_batch(result.has_error(), result.elapsed().as_secs_f64());

                    if self.output.send(result).is_err() {
                        warn!(worker = self.id, "Result channel closed, worker exiting");
                        break;
                    }
                }
                Some(WorkerMessage::Stop) | None => break,
            }
        }

        self.metrics.worker_stopped();
        debug!(worker = self.id, "Worker stopped");
    }
}

/// Execute every task of a batch in order, stopping at the first failure.
///
/// A batch that fails always carries the failing task's result, so an error
/// can never be reported with an empty result list.
#[instrument(skip(batch, cancel), fields(batch = %batch.label(), tasks = batch.len()))]
pub async fn execute_batch<A, R>(
    batch: TaskBatch<A, R>,
    task_timeout: Option<Duration>,
    cancel: &watch::Receiver<bool>,
) -> BatchResult<A, R>
where
    A: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    let metrics = MetricsCollector::new();
    let batch_start = Instant::now();
    let mut results = Vec::with_capacity(batch.len());

    for task in batch.tasks() {
        let cancelled = *cancel.borrow();
        let result = if cancelled {
            TaskResult::failure(
                task.label(),
                task.arguments().clone(),
                TaskError::cancelled(batch.label(), task.label()),
                Duration::ZERO,
            )
        } else {
            execute_task(batch.label(), task, task_timeout, cancel).await
        };

        let outcome = result.error.as_ref().map(|e| e.kind.as_str()).unwrap_or("ok");
        metrics.record_task(outcome, result.elapsed.as_secs_f64());

        let failed = result.is_err();
        if let Some(error) = &result.error {
            debug!(batch = %batch.label(), task = %task.label(), kind = %error.kind, "Task failed, skipping rest of batch");
        }
        results.push(result);

        if failed {
            break;
        }
    }

    BatchResult::from_results(batch.label(), results, batch_start.elapsed())
}

/// Run one task on the blocking pool, honouring the deadline and cancellation
async fn execute_task<A, R>(
    batch_label: &str,
    task: &Task<A, R>,
    task_timeout: Option<Duration>,
    cancel: &watch::Receiver<bool>,
) -> TaskResult<A, R>
where
    A: Clone + Send + Sync + 'static,
    R: Send + 'static,
{
    let started = Instant::now();
    let job = task.clone();
    let handle = tokio::task::spawn_blocking(move || job.invoke());

    let joined = async {
        match task_timeout {
            Some(limit) => tokio::time::timeout(limit, handle).await.ok(),
            None => Some(handle.await),
        }
    };

    let mut cancel = cancel.clone();
    let cancelled = async move {
        // A dropped sender means nobody can cancel any more
        let closed = cancel.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    };

    let outcome = tokio::select! {
        biased;
        joined = joined => Some(joined),
        _ = cancelled => None,
    };

    let elapsed = started.elapsed();
    let arguments = task.arguments().clone();

    // A task abandoned on deadline or cancellation keeps its blocking thread
    // until the callable returns; its result is discarded.
    match outcome {
        Some(Some(Ok(Ok(value)))) => TaskResult::success(task.label(), arguments, value, elapsed),
        Some(Some(Ok(Err(error)))) => TaskResult::failure(
            task.label(),
            arguments,
            TaskError::failed(batch_label, task.label(), &error),
            elapsed,
        ),
        Some(Some(Err(join_error))) => {
            let error = if join_error.is_panic() {
                TaskError::panicked(batch_label, task.label(), join_error.into_panic())
            } else {
                TaskError::cancelled(batch_label, task.label())
            };
            TaskResult::failure(task.label(), arguments, error, elapsed)
        }
        Some(None) => {
            // Only reachable with a deadline configured
            let limit = task_timeout.unwrap_or(elapsed);
            TaskResult::failure(
                task.label(),
                arguments,
                TaskError::timed_out(batch_label, task.label(), limit),
                elapsed,
            )
        }
        None => TaskResult::failure(
            task.label(),
            arguments,
            TaskError::cancelled(batch_label, task.label()),
            elapsed,
        ),
    }
}
