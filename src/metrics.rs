//! Metrics collection for pool execution
//!
//! Provides Prometheus-compatible metrics for monitoring worker activity,
//! batch outcomes and task durations.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Counter for finished batches
    static ref BATCHES: IntCounterVec = register_int_counter_vec!(
        "batch_pool_batches_total",
        "Total number of executed task batches",
        &["status"]
    ).unwrap();

    /// Histogram for batch duration
    static ref BATCH_DURATION: HistogramVec = register_histogram_vec!(
        "batch_pool_batch_duration_seconds",
        "Task batch duration in seconds",
        &["status"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]
    ).unwrap();

    /// Counter for task outcomes
    static ref TASKS: IntCounterVec = register_int_counter_vec!(
        "batch_pool_tasks_total",
        "Total number of executed tasks",
        &["outcome"]
    ).unwrap();

    /// Histogram for task duration
    static ref TASK_DURATION: HistogramVec = register_histogram_vec!(
        "batch_pool_task_duration_seconds",
        "Task duration in seconds",
        &["outcome"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]
    ).unwrap();

    /// Gauge for running workers
    static ref ACTIVE_WORKERS: IntGauge = register_int_gauge!(
        "batch_pool_active_workers",
        "Number of currently running workers"
    ).unwrap();

    /// Counter for pool runs
    static ref POOL_RUNS: IntCounterVec = register_int_counter_vec!(
        "batch_pool_runs_total",
        "Total number of completed pool runs",
        &["status"]
    ).unwrap();
}

fn status_label(has_error: bool) -> &'static str {
    if has_error {
        "error"
    } else {
        "ok"
    }
}

/// Metrics collector for pool execution
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self
    }

    /// Record a worker starting
    pub fn worker_started(&self) {
        ACTIVE_WORKERS.inc();
    }

    /// Record a worker stopping
    pub fn worker_stopped(&self) {
        ACTIVE_WORKERS.dec();
    }

    /// Record a finished task; `outcome` is `ok` or a task error kind
    pub fn record_task(&self, outcome: &str, duration: f64) {
        TASKS.with_label_values(&[outcome]).inc();
        TASK_DURATION.with_label_values(&[outcome]).observe(duration);
    }

    /// Record a finished batch
    pub fn record_batch(&self, has_error: bool, duration: f64) {
        let status = status_label(has_error);
        BATCHES.with_label_values(&[status]).inc();
        BATCH_DURATION.with_label_values(&[status]).observe(duration);
    }

    /// Record a completed pool run
    pub fn record_pool_run(&self, has_errors: bool) {
        POOL_RUNS.with_label_values(&[status_label(has_errors)]).inc();
    }
}

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
