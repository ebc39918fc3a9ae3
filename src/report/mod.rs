//! Run-wide pool report
//!
//! A [`PoolReport`] collects one [`BatchResult`] per submitted batch, in the
//! order the batches finished. Batches are identified by label, never by
//! position. The report offers counts, a summary, an error listing, columnar
//! value extraction and persistence.

mod persistence;

pub use persistence::{SavedReport, REPORT_SCHEMA_VERSION};

use std::fmt::{self, Write as _};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchResult, TaskResult};

/// Error listing limit used when none is given
pub const DEFAULT_ERROR_LIMIT: usize = 6;

/// How many task errors an error listing shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLimit {
    /// List every error
    All,
    /// List at most this many errors
    AtMost(usize),
}

impl Default for ErrorLimit {
    fn default() -> Self {
        ErrorLimit::AtMost(DEFAULT_ERROR_LIMIT)
    }
}

impl From<usize> for ErrorLimit {
    fn from(limit: usize) -> Self {
        ErrorLimit::AtMost(limit)
    }
}

/// Format a duration as `hh:mm:ss`, rounded to the nearest second
pub fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs_f64().round() as u64;
    let (hours, rest) = (seconds / 3600, seconds % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Aggregate of every batch result from one pool run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReport<A, R> {
    worker_count: usize,
    total_elapsed: Duration,
    batch_results: Vec<BatchResult<A, R>>,
    batch_count: usize,
    error_count: usize,
}

impl<A, R> PoolReport<A, R> {
    /// Create an empty report for a run with `worker_count` workers
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            total_elapsed: Duration::ZERO,
            batch_results: Vec::new(),
            batch_count: 0,
            error_count: 0,
        }
    }

    /// Append a batch result, keeping the counters in step
    pub fn record(&mut self, result: BatchResult<A, R>) {
        if result.has_error() {
            self.error_count += 1;
        }
        self.batch_count += 1;
        self.batch_results.push(result);
    }

    pub(crate) fn set_total_elapsed(&mut self, elapsed: Duration) {
        self.total_elapsed = elapsed;
    }

    /// Number of workers the run used
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Wall time from submission until the last result was collected
    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    /// Batch results in completion order
    pub fn batch_results(&self) -> &[BatchResult<A, R>] {
        &self.batch_results
    }

    /// Number of batch results
    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Number of batch results that carry an error
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether any batch failed
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Number of batch results
    pub fn len(&self) -> usize {
        self.batch_count
    }

    /// Whether the report holds no results
    pub fn is_empty(&self) -> bool {
        self.batch_results.is_empty()
    }

    /// Find a batch result by label
    pub fn find(&self, label: &str) -> Option<&BatchResult<A, R>> {
        self.batch_results.iter().find(|b| b.label() == label)
    }

    /// Every failed task result with its batch, in report order
    pub fn errors(&self) -> impl Iterator<Item = (&BatchResult<A, R>, &TaskResult<A, R>)> {
        self.batch_results
            .iter()
            .flat_map(|batch| batch.results().iter().map(move |r| (batch, r)))
            .filter(|(_, r)| r.is_err())
    }

    /// Write up to `limit` task errors, each under its batch, followed by a
    /// notice when errors were left out
    pub fn write_errors<W: fmt::Write>(&self, out: &mut W, limit: ErrorLimit) -> fmt::Result {
        let total = self.errors().count();
        let shown = match limit {
            ErrorLimit::All => total,
            ErrorLimit::AtMost(max) => total.min(max),
        };

        for (batch, result) in self.errors().take(shown) {
            writeln!(out, "{}", batch)?;
            writeln!(out, "\t{}\n", result)?;
        }

        let remaining = total - shown;
        if remaining > 0 {
            writeln!(out, "Error descriptions limited to {} results.", shown)?;
            writeln!(out, "\t{} remaining.", remaining)?;
        }
        Ok(())
    }

    /// Error listing as a string; see [`PoolReport::write_errors`]
    pub fn error_listing(&self, limit: ErrorLimit) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_errors(&mut out, limit);
        out
    }

    /// The value at `index` from every batch, in report order.
    ///
    /// `None` where a batch has no task at that index or the task failed.
    pub fn column(&self, index: usize) -> Vec<Option<&R>> {
        self.batch_results
            .iter()
            .map(|batch| batch.results().get(index).and_then(|r| r.value.as_ref()))
            .collect()
    }

    /// Every batch's task values, in report order
    pub fn outputs(&self) -> Vec<Vec<Option<&R>>> {
        self.batch_results.iter().map(BatchResult::values).collect()
    }
}

impl<A, R: fmt::Debug> PoolReport<A, R> {
    /// Each batch label followed by its task labels and values
    pub fn results_listing(&self) -> String {
        let mut out = String::new();
        for batch in &self.batch_results {
            let _ = writeln!(out, "\t{}", batch.label());
            for result in batch.results() {
                match &result.value {
                    Some(value) => {
                        let _ = writeln!(out, "\t{}: {:?}", result.label, value);
                    }
                    None => {
                        let _ = writeln!(out, "\t{}: <no value>", result.label);
                    }
                }
            }
        }
        out
    }
}

impl<A, R> fmt::Display for PoolReport<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoolReport\n\tWorkers: {}\n\tTaskBatches: {}\n\tErrors: {}\n\tTime: {}",
            self.worker_count,
            self.batch_count,
            self.error_count,
            format_elapsed(self.total_elapsed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::TaskError;
    use pretty_assertions::assert_eq;

    fn ok(label: &str, value: u32) -> TaskResult<u32, u32> {
        TaskResult::success(label, value, value, Duration::from_millis(5))
    }

    fn failed(batch: &str, label: &str) -> TaskResult<u32, u32> {
        let error = anyhow::anyhow!("{} failed", label);
        TaskResult::failure(label, 0, TaskError::failed(batch, label, &error), Duration::from_millis(5))
    }

    fn sample_report() -> PoolReport<u32, u32> {
        let mut report = PoolReport::new(2);
        report.record(BatchResult::from_results("a", vec![ok("a1", 1), ok("a2", 2)], Duration::from_secs(1)));
        report.record(BatchResult::from_results("b", vec![ok("b1", 3), failed("b", "b2")], Duration::from_secs(2)));
        report.record(BatchResult::from_results("c", vec![failed("c", "c1")], Duration::from_secs(3)));
        report
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "00:00:02");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 25 * 60 + 7)), "03:25:07");
    }

    #[test]
    fn test_record_keeps_counts() {
        let report = sample_report();
        assert_eq!(report.batch_count(), 3);
        assert_eq!(report.error_count(), 2);
        assert_eq!(
            report.error_count(),
            report.batch_results().iter().filter(|b| b.has_error()).count()
        );
        assert!(report.has_errors());
    }

    #[test]
    fn test_column_and_outputs() {
        let report = sample_report();
        assert_eq!(report.column(0), vec![Some(&1), Some(&3), None]);
        assert_eq!(report.column(1), vec![Some(&2), None, None]);
        assert_eq!(report.outputs()[0], vec![Some(&1), Some(&2)]);
    }

    #[test]
    fn test_error_listing_truncates() {
        let report = sample_report();

        let one = report.error_listing(ErrorLimit::AtMost(1));
        assert!(one.contains("b2"));
        assert!(!one.contains("c1"));
        assert!(one.contains("Error descriptions limited to 1 results."));
        assert!(one.contains("1 remaining."));

        let all = report.error_listing(ErrorLimit::All);
        assert!(all.contains("b2"));
        assert!(all.contains("c1"));
        assert!(!all.contains("remaining"));
    }

    #[test]
    fn test_summary() {
        let report = sample_report();
        assert_eq!(
            report.to_string(),
            "PoolReport\n\tWorkers: 2\n\tTaskBatches: 3\n\tErrors: 2\n\tTime: 00:00:00"
        );
    }

    #[test]
    fn test_results_listing() {
        let report = sample_report();
        let listing = report.results_listing();
        assert!(listing.starts_with("\ta\n\ta1: 1\n\ta2: 2\n"));
        assert!(listing.contains("\tb2: <no value>"));
    }

    #[test]
    fn test_default_limit() {
        assert_eq!(ErrorLimit::default(), ErrorLimit::AtMost(DEFAULT_ERROR_LIMIT));
        assert_eq!(ErrorLimit::from(3), ErrorLimit::AtMost(3));
    }
}
