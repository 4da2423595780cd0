use crate::error::StateStoreError;
use async_trait::async_trait;

pub mod models;
pub mod sled_store;

pub use models::{Checkpoint, CheckpointStage};

/// Durable progress of batched jobs, keyed by job id.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Stores `cp` unless it would move the job's progress backwards.
    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError>;
    async fn load_checkpoint(&self, job_id: &str) -> Result<Option<Checkpoint>, StateStoreError>;
    async fn clear_checkpoint(&self, job_id: &str) -> Result<(), StateStoreError>;
    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, StateStoreError>;
}
