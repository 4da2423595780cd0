use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to open state store: {0}")]
    Open(#[source] sled::Error),

    #[error("Failed to save checkpoint: {0}")]
    SaveCheckpoint(String),

    #[error("Failed to load checkpoint: {0}")]
    LoadCheckpoint(String),

    #[error("Failed to encode checkpoint: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("State store error: {0}")]
    Storage(#[from] sled::Error),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Failed to load checkpoint: {0}")]
    LoadCheckpoint(#[from] StateStoreError),

    #[error("No progress recorded for job '{0}'")]
    UnknownJob(String),
}
