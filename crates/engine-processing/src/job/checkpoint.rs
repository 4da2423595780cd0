use engine_core::{
    error::StateStoreError,
    state::{Checkpoint, CheckpointStage, StateStore},
};
use model::{
    core::identifiers::JobId,
    pagination::{cursor::Key, range::BatchRange},
};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// Writes a job's progress to the state store as windows commit.
pub(crate) struct CheckpointWriter {
    store: Arc<dyn StateStore>,
    checkpoint: Checkpoint,
}

impl CheckpointWriter {
    /// A fresh run discards whatever an earlier run of the same job left; a
    /// resumed run continues the stored record when it covers the same range.
    pub(crate) async fn start(
        store: Arc<dyn StateStore>,
        job_id: &JobId,
        table: &str,
        range: &BatchRange,
        resume_after: Option<&Key>,
    ) -> Result<Self, StateStoreError> {
        let checkpoint = match resume_after {
            None => {
                store.clear_checkpoint(job_id.as_str()).await?;
                Checkpoint::new(job_id.as_str(), table, range)
            }
            Some(key) => match store.load_checkpoint(job_id.as_str()).await? {
                Some(mut existing) if &existing.range() == range => {
                    existing.stage = CheckpointStage::Running;
                    existing.last_error = None;
                    existing
                }
                _ => {
                    let mut checkpoint = Checkpoint::new(job_id.as_str(), table, range);
                    checkpoint.last_completed = Some(key.components().to_vec());
                    checkpoint
                }
            },
        };

        store.save_checkpoint(&checkpoint).await?;
        debug!(job = %job_id, range = %range, "Checkpoint initialised");
        Ok(CheckpointWriter { store, checkpoint })
    }

    pub(crate) async fn advance(&mut self, key: &Key, rows: u64) -> Result<(), StateStoreError> {
        self.checkpoint.advance(key, rows);
        self.store.save_checkpoint(&self.checkpoint).await
    }

    pub(crate) async fn complete(&mut self) -> Result<(), StateStoreError> {
        self.checkpoint.complete();
        self.store.save_checkpoint(&self.checkpoint).await
    }

    /// Save errors are logged, not returned.
    pub(crate) async fn fail(&mut self, error: impl fmt::Display) {
        self.checkpoint.fail(error);
        if let Err(err) = self.store.save_checkpoint(&self.checkpoint).await {
            warn!(job = %self.checkpoint.job_id, error = %err, "Failed to record job failure");
        }
    }
}
