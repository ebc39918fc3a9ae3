//! Tasks, batches, workers and pool orchestration

pub mod config;
pub mod executor;
pub mod pool;
pub mod types;

pub use config::*;
pub use executor::execute_batch;
pub use pool::*;
pub use types::*;
