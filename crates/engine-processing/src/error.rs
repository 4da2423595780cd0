use connectors::sql::base::error::DbError;
use engine_core::error::StateStoreError;
use model::{
    execution::errors::ConfigurationError,
    pagination::cursor::Key,
    records::batch::SubBatch,
};
use thiserror::Error;

/// Raised by a mutation step while applying one window.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Step failed: {0}")]
    Step(String),
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigurationError),

    #[error("Mutation failed for sub-batch {window}: {source}")]
    Mutation {
        window: SubBatch,
        #[source]
        source: MutationError,
    },

    #[error("Failed to select next sub-batch after {}: {source}", display_after(.after))]
    Cursor {
        after: Option<Key>,
        #[source]
        source: DbError,
    },

    #[error("perform() may only be called once per job")]
    AlreadyPerformed,

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] StateStoreError),
}

fn display_after(after: &Option<Key>) -> String {
    after
        .as_ref()
        .map(|key| key.to_string())
        .unwrap_or_else(|| "range start".to_string())
}

impl JobError {
    /// The underlying store error, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            JobError::Mutation {
                source: MutationError::Db(err),
                ..
            } => Some(err),
            JobError::Cursor { source, .. } => Some(source),
            _ => None,
        }
    }
}
