// Report persistence - versioned bincode envelope on the local file system

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use super::PoolReport;
use crate::{PoolError, Result};

/// Schema version written into every saved report
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Borrowed form of [`SavedReport`] used when writing.
/// Field order must match `SavedReport`; `schema_version` stays first.
#[derive(Serialize)]
struct SavedReportRef<'a, A, R> {
    schema_version: u32,
    run_id: Uuid,
    created_at: DateTime<Utc>,
    report: &'a PoolReport<A, R>,
}

/// A report read back from disk, with the envelope's metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedReport<A, R> {
    /// Schema version the report was written with
    pub schema_version: u32,
    /// Identifier assigned when the report was saved
    pub run_id: Uuid,
    /// When the report was saved
    pub created_at: DateTime<Utc>,
    /// The report itself
    pub report: PoolReport<A, R>,
}

impl<A, R> PoolReport<A, R>
where
    A: Serialize + DeserializeOwned,
    R: Serialize + DeserializeOwned,
{
    /// Save the whole report to `path`, returning the identifier assigned to it
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<Uuid> {
        let path = path.as_ref();
        let run_id = Uuid::new_v4();
        let envelope = SavedReportRef {
            schema_version: REPORT_SCHEMA_VERSION,
            run_id,
            created_at: Utc::now(),
            report: self,
        };

        let bytes = bincode::serialize(&envelope)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, &bytes).await?;

        info!(path = %path.display(), run_id = %run_id, bytes = bytes.len(), "Saved pool report");
        Ok(run_id)
    }

    /// Load a report saved with [`PoolReport::save`]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::load_saved(path).await?.report)
    }

    /// Load a saved report together with its envelope metadata
    pub async fn load_saved(path: impl AsRef<Path>) -> Result<SavedReport<A, R>> {
        let path = path.as_ref();
        let bytes = fs::read(path).await?;

        // The version prefix is read on its own so that newer layouts are
        // rejected cleanly instead of failing somewhere inside the report
        let found: u32 = bincode::deserialize(&bytes)?;
        if found != REPORT_SCHEMA_VERSION {
            return Err(PoolError::SchemaVersion {
                found,
                expected: REPORT_SCHEMA_VERSION,
            });
        }

        let saved: SavedReport<A, R> = bincode::deserialize(&bytes)?;
        saved.report.check_consistency()?;

        debug!(path = %path.display(), run_id = %saved.run_id, created_at = %saved.created_at, "Loaded pool report");
        Ok(saved)
    }

    /// Pretty-printed JSON rendering of the report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl<A, R> PoolReport<A, R> {
    fn check_consistency(&self) -> Result<()> {
        if self.batch_count != self.batch_results.len() {
            return Err(PoolError::InconsistentReport(format!(
                "batch count {} does not match {} stored results",
                self.batch_count,
                self.batch_results.len()
            )));
        }

        if let Some(batch) = self.batch_results.iter().find(|b| !b.is_consistent()) {
            return Err(PoolError::InconsistentReport(format!(
                "error flag of batch '{}' does not match its task results",
                batch.label()
            )));
        }

        let flagged = self.batch_results.iter().filter(|b| b.has_error()).count();
        if self.error_count != flagged {
            return Err(PoolError::InconsistentReport(format!(
                "error count {} does not match {} failed batches",
                self.error_count, flagged
            )));
        }
        Ok(())
    }
}
