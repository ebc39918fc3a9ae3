//! # batch-pool
//!
//! A worker pool for running labelled batches of tasks in parallel.
//!
//! ## Overview
//!
//! Work is described as [`Task`]s (a callable, its arguments and a label)
//! grouped into [`TaskBatch`]es. A [`Pool`] spawns a fixed number of workers
//! that pull batches from a shared channel, run each batch's tasks in order and
//! send back one [`BatchResult`] per batch. A failing task stops the rest of its
//! own batch but never affects other batches. The pool returns a
//! [`PoolReport`] once every batch has been accounted for.
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_pool::{Pool, PoolConfig, Task, TaskBatch};
//!
//! # async fn example() -> batch_pool::Result<()> {
//! let batches: Vec<TaskBatch<u64, u64>> = (1..=5)
//!     .map(|i| {
//!         TaskBatch::new(format!("batch_{}", i))
//!             .with_task(Task::new(format!("double_{}", i), i, |x: &u64| Ok(x * 2)))
//!     })
//!     .collect();
//!
//! let report = Pool::new(PoolConfig::default().with_workers(2))
//!     .run(batches)
//!     .await?;
//!
//! assert_eq!(report.batch_count(), 5);
//! assert_eq!(report.error_count(), 0);
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: tasks, batches, workers and pool orchestration
//! - [`report`]: run-wide report, listings and persistence
//! - [`tools`]: ready-made callables (external commands)
//! - [`metrics`]: Prometheus metrics for pool activity

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Main error type for pool operations
///
/// Task failures never show up here; they are captured into the
/// [`PoolReport`] instead.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A run was submitted with no batches
    #[error("No task batches were submitted")]
    NoBatches,

    /// A run was configured with an unusable worker count
    #[error("Invalid worker count: {0} (at least one worker is required)")]
    InvalidWorkerCount(usize),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The result channel closed before every batch reported back
    #[error("Result channel closed after {received} of {expected} batch results")]
    ChannelClosed {
        /// Results received before the channel closed
        received: usize,
        /// Results expected for the submitted batches
        expected: usize,
    },

    /// A worker task died outside of task execution
    #[error("Worker failed: {0}")]
    WorkerFailed(#[from] tokio::task::JoinError),

    /// I/O error while persisting or loading a report
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary encoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A saved report was written with a different schema
    #[error("Unsupported report schema version {found} (expected {expected})")]
    SchemaVersion {
        /// Version found in the saved report
        found: u32,
        /// Version this build reads and writes
        expected: u32,
    },

    /// A saved report failed its consistency checks
    #[error("Inconsistent report: {0}")]
    InconsistentReport(String),
}

/// Tasks, batches, workers and pool orchestration
pub mod batch;

/// Pool reports, listings and persistence
pub mod report;

/// Ready-made task callables
pub mod tools;

/// Prometheus metrics for pool activity
pub mod metrics;

pub use batch::{
    run_pool, BatchResult, CancelHandle, Pool, PoolConfig, Task, TaskBatch, TaskError,
    TaskErrorKind, TaskResult,
};
pub use report::{format_elapsed, ErrorLimit, PoolReport, SavedReport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PoolError::InvalidWorkerCount(0);
        assert!(err.to_string().contains("Invalid worker count: 0"));

        let err = PoolError::ChannelClosed { received: 2, expected: 5 };
        assert_eq!(
            err.to_string(),
            "Result channel closed after 2 of 5 batch results"
        );
    }

    #[test]
    fn test_schema_version_message() {
        let err = PoolError::SchemaVersion { found: 7, expected: 1 };
        assert!(err.to_string().contains("version 7"));
    }
}
