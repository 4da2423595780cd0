use crate::{
    error::ProgressError,
    state::{
        StateStore,
        models::{Checkpoint, CheckpointStage},
    },
};
use chrono::{DateTime, Utc};
use model::pagination::{cursor::Key, range::BatchRange};
use serde::Serialize;
use std::{fmt, sync::Arc};

#[derive(Clone)]
pub struct ProgressService {
    pub store: Arc<dyn StateStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    Idle,
    Running,
    Done,
    Failed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Idle => "Idle",
            ProgressStage::Running => "Running",
            ProgressStage::Done => "Done",
            ProgressStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressStatus {
    pub job_id: String,
    pub table: String,
    pub stage: ProgressStage,
    pub range: BatchRange,
    pub last_key: Option<Key>,
    pub sub_batches_done: u64,
    pub rows_affected: u64,
    /// Share of the scalar key space already covered; `None` for composite keys.
    pub percent_done: Option<f64>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        ProgressService { store }
    }

    pub async fn job_status(&self, job_id: &str) -> Result<ProgressStatus, ProgressError> {
        let checkpoint = self
            .store
            .load_checkpoint(job_id)
            .await?
            .ok_or_else(|| ProgressError::UnknownJob(job_id.to_string()))?;

        Ok(status_from_checkpoint(&checkpoint))
    }

    pub async fn all_jobs(&self) -> Result<Vec<ProgressStatus>, ProgressError> {
        let checkpoints = self.store.list_checkpoints().await?;
        Ok(checkpoints.iter().map(status_from_checkpoint).collect())
    }
}

fn status_from_checkpoint(cp: &Checkpoint) -> ProgressStatus {
    let range = cp.range();
    let last_key = cp.last_completed_key();

    let stage = match cp.stage {
        CheckpointStage::Completed => ProgressStage::Done,
        CheckpointStage::Failed => ProgressStage::Failed,
        CheckpointStage::Running if last_key.is_none() => ProgressStage::Idle,
        CheckpointStage::Running => ProgressStage::Running,
    };

    let percent_done = match cp.stage {
        CheckpointStage::Completed => Some(100.0),
        _ => scalar_percent(&range, last_key.as_ref()),
    };

    ProgressStatus {
        job_id: cp.job_id.clone(),
        table: cp.table.clone(),
        stage,
        range,
        last_key,
        sub_batches_done: cp.sub_batches_done,
        rows_affected: cp.rows_affected,
        percent_done,
        last_error: cp.last_error.clone(),
        updated_at: cp.updated_at,
    }
}

fn scalar_percent(range: &BatchRange, last: Option<&Key>) -> Option<f64> {
    let start = range.start.as_scalar()?;
    let end = range.end.as_scalar()?;
    if start > end {
        return Some(100.0);
    }
    let Some(last) = last else {
        return Some(0.0);
    };
    let last = last.as_scalar()?;

    let total = (end as f64 - start as f64) + 1.0;
    let done = (last.min(end) as f64 - start as f64) + 1.0;
    Some((done / total * 100.0).clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sled_store::SledStateStore;
    use tempfile::tempdir;

    const JOB_ID: &str = "copy-users-name";

    fn service() -> (tempfile::TempDir, Arc<dyn StateStore>, ProgressService) {
        let dir = tempdir().unwrap();
        let store: Arc<dyn StateStore> =
            Arc::new(SledStateStore::open(dir.path()).expect("open sled"));
        let service = ProgressService::new(store.clone());
        (dir, store, service)
    }

    #[tokio::test]
    async fn reports_running_with_percentage() {
        let (_dir, store, service) = service();

        let mut cp = Checkpoint::new(JOB_ID, "users", &BatchRange::new(1, 200));
        cp.advance(&Key::Scalar(50), 50);
        store.save_checkpoint(&cp).await.unwrap();

        let status = service.job_status(JOB_ID).await.unwrap();
        assert_eq!(status.stage, ProgressStage::Running);
        assert_eq!(status.rows_affected, 50);
        assert_eq!(status.last_key, Some(Key::Scalar(50)));
        assert_eq!(status.percent_done, Some(25.0));
    }

    #[tokio::test]
    async fn reports_done_and_failed() {
        let (_dir, store, service) = service();

        let mut cp = Checkpoint::new(JOB_ID, "users", &BatchRange::new(1, 10));
        cp.advance(&Key::Scalar(10), 3);
        cp.complete();
        store.save_checkpoint(&cp).await.unwrap();
        assert_eq!(service.job_status(JOB_ID).await.unwrap().stage, ProgressStage::Done);

        let mut failed = Checkpoint::new("other", "events", &BatchRange::new(1, 10));
        failed.fail("deadlock detected");
        store.save_checkpoint(&failed).await.unwrap();

        let status = service.job_status("other").await.unwrap();
        assert_eq!(status.stage, ProgressStage::Failed);
        assert_eq!(status.last_error.as_deref(), Some("deadlock detected"));
        assert_eq!(service.all_jobs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn composite_ranges_have_no_percentage() {
        let (_dir, store, service) = service();

        let range = BatchRange::new(vec![1, 1], vec![9, 500]);
        let mut cp = Checkpoint::new(JOB_ID, "deployment_merge_requests", &range);
        cp.advance(&Key::Tuple(vec![3, 20]), 7);
        store.save_checkpoint(&cp).await.unwrap();

        let status = service.job_status(JOB_ID).await.unwrap();
        assert_eq!(status.percent_done, None);
        assert_eq!(status.last_key, Some(Key::Tuple(vec![3, 20])));
    }

    #[tokio::test]
    async fn unknown_job_is_an_error() {
        let (_dir, _store, service) = service();
        assert!(matches!(
            service.job_status("missing").await,
            Err(ProgressError::UnknownJob(_))
        ));
    }
}
