use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::report::format_elapsed;

/// Callable executed by a task: borrows the task's arguments and returns a
/// value or an error.
pub type Callable<A, R> = Arc<dyn Fn(&A) -> anyhow::Result<R> + Send + Sync>;

/// The smallest unit of work: a callable, its arguments and a label.
///
/// Cloning a task is cheap; the callable and arguments are shared.
pub struct Task<A, R> {
    label: String,
    arguments: Arc<A>,
    callable: Callable<A, R>,
}

impl<A, R> Task<A, R> {
    /// Create a task from a label, its arguments and the callable to invoke
    pub fn new<F>(label: impl Into<String>, arguments: A, callable: F) -> Self
    where
        F: Fn(&A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            arguments: Arc::new(arguments),
            callable: Arc::new(callable),
        }
    }

    /// Create a task sharing an existing callable
    pub fn with_callable(label: impl Into<String>, arguments: A, callable: Callable<A, R>) -> Self {
        Self {
            label: label.into(),
            arguments: Arc::new(arguments),
            callable,
        }
    }

    /// Task label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Arguments the callable is invoked with
    pub fn arguments(&self) -> &A {
        &self.arguments
    }

    /// Invoke the callable with this task's arguments
    pub fn invoke(&self) -> anyhow::Result<R> {
        (self.callable)(&self.arguments)
    }
}

impl<A, R> Clone for Task<A, R> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            arguments: Arc::clone(&self.arguments),
            callable: Arc::clone(&self.callable),
        }
    }
}

impl<A: fmt::Debug, R> fmt::Debug for Task<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("arguments", &self.arguments)
            .field("callable", &"Fn")
            .finish()
    }
}

/// An ordered group of tasks executed sequentially by a single worker.
pub struct TaskBatch<A, R> {
    label: String,
    tasks: Vec<Task<A, R>>,
}

impl<A, R> TaskBatch<A, R> {
    /// Create an empty batch
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tasks: Vec::new(),
        }
    }

    /// Create a batch from tasks, keeping their order
    pub fn from_tasks(label: impl Into<String>, tasks: impl IntoIterator<Item = Task<A, R>>) -> Self {
        Self {
            label: label.into(),
            tasks: tasks.into_iter().collect(),
        }
    }

    /// Append a task
    pub fn add_task(&mut self, task: Task<A, R>) {
        self.tasks.push(task);
    }

    /// Append a task, builder style
    pub fn with_task(mut self, task: Task<A, R>) -> Self {
        self.add_task(task);
        self
    }

    /// Batch label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Tasks in execution order
    pub fn tasks(&self) -> &[Task<A, R>] {
        &self.tasks
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the batch holds no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<A, R> Clone for TaskBatch<A, R> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<A, R> fmt::Debug for TaskBatch<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.tasks.iter().map(|t| t.label()).collect();
        f.debug_struct("TaskBatch")
            .field("label", &self.label)
            .field("tasks", &labels)
            .finish()
    }
}

/// Why a task did not produce a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskErrorKind {
    /// The callable returned an error
    Failed,
    /// The callable panicked
    Panicked,
    /// The callable ran past the configured deadline
    TimedOut,
    /// The pool was cancelled before or while the task ran
    Cancelled,
}

impl TaskErrorKind {
    /// Short lowercase name, used as a metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskErrorKind::Failed => "failed",
            TaskErrorKind::Panicked => "panicked",
            TaskErrorKind::TimedOut => "timed_out",
            TaskErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured description of a task failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("task '{task_label}' in batch '{batch_label}' {kind}: {message}")]
pub struct TaskError {
    /// Failure category
    pub kind: TaskErrorKind,
    /// Label of the failing task
    pub task_label: String,
    /// Label of the batch the task belongs to
    pub batch_label: String,
    /// Error message, including the full cause chain
    pub message: String,
    /// Call trace captured with the error (empty when unavailable)
    pub trace: String,
}

impl TaskError {
    /// Capture an error returned by a callable
    pub fn failed(batch_label: &str, task_label: &str, error: &anyhow::Error) -> Self {
        let backtrace = error.backtrace();
        let trace = match backtrace.status() {
            BacktraceStatus::Captured => backtrace.to_string(),
            _ => String::new(),
        };

        Self {
            kind: TaskErrorKind::Failed,
            task_label: task_label.to_string(),
            batch_label: batch_label.to_string(),
            message: format!("{:#}", error),
            trace,
        }
    }

    /// Capture a panic payload from a callable
    pub fn panicked(batch_label: &str, task_label: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };

        Self {
            kind: TaskErrorKind::Panicked,
            task_label: task_label.to_string(),
            batch_label: batch_label.to_string(),
            message,
            trace: String::new(),
        }
    }

    /// A task that exceeded its deadline
    pub fn timed_out(batch_label: &str, task_label: &str, limit: Duration) -> Self {
        Self {
            kind: TaskErrorKind::TimedOut,
            task_label: task_label.to_string(),
            batch_label: batch_label.to_string(),
            message: format!("exceeded deadline of {:?}", limit),
            trace: String::new(),
        }
    }

    /// A task stopped by pool cancellation
    pub fn cancelled(batch_label: &str, task_label: &str) -> Self {
        Self {
            kind: TaskErrorKind::Cancelled,
            task_label: task_label.to_string(),
            batch_label: batch_label.to_string(),
            message: "pool was cancelled".to_string(),
            trace: String::new(),
        }
    }

    /// Full description: the error line followed by the call trace, if any
    pub fn detail(&self) -> String {
        if self.trace.is_empty() {
            self.to_string()
        } else {
            format!("{}\n{}", self, self.trace)
        }
    }
}

/// Outcome of a single task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult<A, R> {
    /// Label of the task
    pub label: String,
    /// Arguments the task was invoked with
    pub arguments: A,
    /// Returned value, absent when the task failed
    pub value: Option<R>,
    /// Wall-clock time spent on this task
    pub elapsed: Duration,
    /// Captured error, absent on success
    pub error: Option<TaskError>,
}

impl<A, R> TaskResult<A, R> {
    /// Successful outcome
    pub fn success(label: impl Into<String>, arguments: A, value: R, elapsed: Duration) -> Self {
        Self {
            label: label.into(),
            arguments,
            value: Some(value),
            elapsed,
            error: None,
        }
    }

    /// Failed outcome
    pub fn failure(label: impl Into<String>, arguments: A, error: TaskError, elapsed: Duration) -> Self {
        Self {
            label: label.into(),
            arguments,
            value: None,
            elapsed,
            error: Some(error),
        }
    }

    /// Whether the task produced a value
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the task carries an error
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

impl<A, R> fmt::Display for TaskResult<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.label, format_elapsed(self.elapsed))?;
        if let Some(error) = &self.error {
            write!(f, ", EXCEPTION: \n{}", error.detail())?;
        }
        Ok(())
    }
}

/// Outcome of one batch: every task result in execution order.
///
/// `has_error` is derived from the contained results, so a batch result
/// flags an error exactly when one of its task results carries one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult<A, R> {
    label: String,
    results: Vec<TaskResult<A, R>>,
    elapsed: Duration,
    has_error: bool,
}

impl<A, R> BatchResult<A, R> {
    /// Build a batch result from task results
    pub fn from_results(label: impl Into<String>, results: Vec<TaskResult<A, R>>, elapsed: Duration) -> Self {
        let has_error = results.iter().any(TaskResult::is_err);
        Self {
            label: label.into(),
            results,
            elapsed,
            has_error,
        }
    }

    /// Batch label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Task results in execution order
    pub fn results(&self) -> &[TaskResult<A, R>] {
        &self.results
    }

    /// Wall-clock time spent on the whole batch
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether any task in the batch failed
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// The first captured error, if any
    pub fn error(&self) -> Option<&TaskError> {
        self.results.iter().find_map(|r| r.error.as_ref())
    }

    /// Values of the task results in order (`None` for failed tasks)
    pub fn values(&self) -> Vec<Option<&R>> {
        self.results.iter().map(|r| r.value.as_ref()).collect()
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.has_error == self.results.iter().any(TaskResult::is_err)
    }
}

impl<A, R> fmt::Display for BatchResult<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.label, format_elapsed(self.elapsed))?;
        if self.has_error {
            f.write_str(", EXCEPTION recorded.")?;
        }
        Ok(())
    }
}
