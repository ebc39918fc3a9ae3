//! External command tasks
//!
//! Runs a program to completion and turns a non-zero exit status or a
//! missing expected output into an error, so shell-outs can be batched like
//! any other callable.

use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ToolError;
use crate::batch::Task;

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to run
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// File the command is expected to produce. When it already exists the
    /// command is skipped; when the command does not create it, that is an
    /// error.
    pub expected_output: Option<PathBuf>,
    /// Working directory
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Invocation of `program` without arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            expected_output: None,
            current_dir: None,
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the expected output file
    pub fn expect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = Some(path.into());
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a successful command produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The expected output already existed; the command was not run
    Skipped(PathBuf),
    /// The command ran and created the expected output
    Produced(PathBuf),
    /// The command ran and exited successfully; captured stdout
    Completed(String),
}

/// Run `spec` to completion
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutcome, ToolError> {
    if let Some(output) = &spec.expected_output {
        if output.exists() {
            debug!(output = %output.display(), "Output already present, skipping command");
            return Ok(CommandOutcome::Skipped(output.clone()));
        }
    }

    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    debug!(command = %spec.display(), "Running command");
    let output = command.output().map_err(|source| ToolError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(ToolError::NonZeroExit {
            command: spec.display(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    match &spec.expected_output {
        Some(path) if path.exists() => Ok(CommandOutcome::Produced(path.clone())),
        Some(path) => Err(ToolError::MissingOutput(path.clone())),
        None => Ok(CommandOutcome::Completed(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        )),
    }
}

/// Task running `spec` through [`run_command`]
pub fn command_task(label: impl Into<String>, spec: CommandSpec) -> Task<CommandSpec, CommandOutcome> {
    Task::new(label, spec, |spec: &CommandSpec| Ok(run_command(spec)?))
}
