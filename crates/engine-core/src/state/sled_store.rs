use crate::{
    error::StateStoreError,
    state::{
        StateStore,
        models::{Checkpoint, CheckpointStage},
    },
};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path).map_err(StateStoreError::Open)?;
        Ok(Self { db })
    }

    #[inline]
    fn chk_key(job_id: &str) -> String {
        format!("chk:{job_id}")
    }

    /// Ranks the stage for comparison logic: Running (1) < Failed (2) < Completed (3).
    fn stage_rank(stage: CheckpointStage) -> u8 {
        match stage {
            CheckpointStage::Running => 1,
            CheckpointStage::Failed => 2,
            CheckpointStage::Completed => 3,
        }
    }

    /// A save may not move the last completed key backwards, nor downgrade a
    /// stage for the same key (a completed job stays completed).
    fn should_replace(existing: &Checkpoint, incoming: &Checkpoint) -> bool {
        if existing.range_start != incoming.range_start || existing.range_end != incoming.range_end {
            return true;
        }

        match (
            existing.last_completed_key(),
            incoming.last_completed_key(),
        ) {
            (Some(old), Some(new)) if new < old => false,
            (Some(_), None) => false,
            (Some(old), Some(new)) if new == old => {
                // Failed and running are interchangeable at the same position (a retry resumes).
                existing.stage != CheckpointStage::Completed
                    || Self::stage_rank(incoming.stage) >= Self::stage_rank(existing.stage)
            }
            _ => true,
        }
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError> {
        let key = Self::chk_key(&cp.job_id);
        let new_bytes = bincode::serialize(cp)?;

        // Compare and write in one transaction.
        let result = self.db.transaction::<_, _, StateStoreError>(|tx_db| {
            if let Some(existing_bytes) = tx_db.get(&key)? {
                let existing: Checkpoint = bincode::deserialize(&existing_bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;

                if !Self::should_replace(&existing, cp) {
                    debug!(job_id = %cp.job_id, "Skipping checkpoint that would move backwards");
                    return Ok(());
                }
            }

            tx_db.insert(key.as_bytes(), new_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {
                self.db.flush_async().await?;
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StateStoreError::SaveCheckpoint(e.to_string())),
        }
    }

    async fn load_checkpoint(&self, job_id: &str) -> Result<Option<Checkpoint>, StateStoreError> {
        match self.db.get(Self::chk_key(job_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn clear_checkpoint(&self, job_id: &str) -> Result<(), StateStoreError> {
        self.db.remove(Self::chk_key(job_id))?;
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StateStoreError> {
        let mut checkpoints = Vec::new();
        for item in self.db.scan_prefix("chk:") {
            let (_key, value) = item?;
            let cp: Checkpoint = bincode::deserialize(&value)
                .map_err(|e| StateStoreError::LoadCheckpoint(e.to_string()))?;
            checkpoints.push(cp);
        }
        Ok(checkpoints)
    }
}
