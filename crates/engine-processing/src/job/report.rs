use chrono::Utc;
use engine_config::report::summary::JobSummary;
use engine_core::metrics::BatchMetrics;
use model::{
    core::identifiers::JobId,
    pagination::{cursor::Key, range::BatchRange},
};
use serde::Serialize;
use std::{fmt, time::Duration};

/// Lifecycle of one job instance. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Ready,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Ready => "ready",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a successful `perform` did.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub job_id: JobId,
    pub table: String,
    pub operation: String,
    pub state: JobState,
    pub range: BatchRange,
    pub sub_batches: usize,
    pub rows_affected: u64,
    pub last_completed: Option<Key>,
    pub elapsed: Duration,
    /// Number of `perform` calls it took, counting retries.
    pub attempts: usize,
}

impl JobReport {
    pub fn to_summary(&self, metrics: &BatchMetrics) -> JobSummary {
        JobSummary {
            job_id: self.job_id.to_string(),
            table: self.table.clone(),
            operation: self.operation.clone(),
            state: self.state.to_string(),
            range: Some(self.range.clone()),
            sub_batches: self.sub_batches,
            rows_affected: self.rows_affected,
            last_completed: self.last_completed.clone(),
            elapsed_ms: self.elapsed.as_millis(),
            attempts: self.attempts,
            metrics: metrics.snapshot(),
            timings: metrics.timings(),
            error: None,
            finished_at: Utc::now(),
        }
    }
}
