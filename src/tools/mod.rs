//! Ready-made task callables
//!
//! Callables that wrap common kinds of work so they can be placed in a
//! [`TaskBatch`](crate::batch::TaskBatch) directly.

use std::path::PathBuf;

use thiserror::Error;

pub mod command;

pub use command::{command_task, run_command, CommandOutcome, CommandSpec};

/// Errors raised by the bundled callables
#[derive(Error, Debug)]
pub enum ToolError {
    /// The program could not be started
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The program exited unsuccessfully
    #[error("Command '{command}' exited with {status}: {stderr}")]
    NonZeroExit {
        /// Command line that was run
        command: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// The program succeeded but did not create its expected output
    #[error("Output not created: {}", .0.display())]
    MissingOutput(PathBuf),
}
