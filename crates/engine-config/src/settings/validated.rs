use crate::settings::{GateConfig, StepConfig, error::JobConfigError};
use connectors::sql::base::{adapter::SqlAdapter, probe::KeyProbe};
use engine_core::retry::RetryPolicy;
use model::{
    core::identifiers::JobId,
    execution::spec::BatchSpec,
    pagination::{cursor::Key, range::BatchRange},
};
use tracing::{info, warn};

/// A job document that passed validation, ready to be turned into a job.
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub job_id: JobId,
    pub spec: BatchSpec,
    pub start: Option<Key>,
    pub end: Option<Key>,
    pub step: StepConfig,
    pub gate: Option<GateConfig>,
    pub retry: RetryPolicy,
}

impl ValidatedJob {
    /// The range to scan, filling missing bounds from the table's smallest and
    /// largest key. `None` when a bound is needed but the table has no rows.
    pub async fn resolve_range(
        &self,
        probe: &dyn KeyProbe,
    ) -> Result<Option<BatchRange>, JobConfigError> {
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            return Ok(Some(BatchRange {
                start: start.clone(),
                end: end.clone(),
            }));
        }

        let Some(bounds) = probe
            .key_bounds(self.spec.table(), self.spec.key_columns())
            .await?
        else {
            info!(table = %self.spec.table(), "Table has no rows, nothing to backfill");
            return Ok(None);
        };

        let range = BatchRange {
            start: self.start.clone().unwrap_or(bounds.start),
            end: self.end.clone().unwrap_or(bounds.end),
        };
        range.check_arity(self.spec.key_columns().len())?;

        info!(table = %self.spec.table(), range = %range, "Resolved batch range from table bounds");
        Ok(Some(range))
    }

    /// Confirms the table and its batch columns exist.
    pub async fn check_schema(&self, adapter: &dyn SqlAdapter) -> Result<(), JobConfigError> {
        let table = self.spec.table();
        if !adapter.table_exists(table).await? {
            return Err(JobConfigError::MissingTable(table.to_string()));
        }

        let columns = adapter.table_columns(table).await?;
        for key in self.spec.key_columns().columns() {
            if !columns.iter().any(|c| c == key.name()) {
                warn!(table = %table, column = %key, "Batch column missing");
                return Err(JobConfigError::MissingKeyColumn {
                    table: table.to_string(),
                    column: key.name().to_string(),
                });
            }
        }
        Ok(())
    }
}
