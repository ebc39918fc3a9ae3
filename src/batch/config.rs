//! Pool configuration.

use std::time::Duration;

use crate::{PoolError, Result};

/// Environment variable overriding the worker count
pub const WORKERS_ENV: &str = "BATCH_POOL_WORKERS";

/// Environment variable setting a per-task deadline in milliseconds
pub const TASK_TIMEOUT_ENV: &str = "BATCH_POOL_TASK_TIMEOUT_MS";

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers to spawn
    pub workers: usize,
    /// Deadline for a single task; `None` lets tasks run indefinitely
    pub task_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            task_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Set the number of workers.
    ///
    /// Zero is accepted here and rejected when the pool runs.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set a per-task deadline
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Defaults overridden by `BATCH_POOL_WORKERS` and
    /// `BATCH_POOL_TASK_TIMEOUT_MS` when they are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(WORKERS_ENV) {
            config.workers = raw.trim().parse().map_err(|_| {
                PoolError::InvalidConfig(format!("{} must be a positive integer, got '{}'", WORKERS_ENV, raw))
            })?;
        }

        if let Some(raw) = lookup(TASK_TIMEOUT_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                PoolError::InvalidConfig(format!("{} must be milliseconds, got '{}'", TASK_TIMEOUT_ENV, raw))
            })?;
            config.task_timeout = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }
}
