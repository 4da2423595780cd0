use connectors::sql::base::error::{ConnectorError, DbError};
use engine_config::settings::error::JobConfigError;
use engine_core::error::{ProgressError, StateStoreError};
use engine_processing::error::JobError;
use model::execution::errors::ConfigurationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read or write a file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    JobConfig(#[from] JobConfigError),

    #[error("Invalid step configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid env file: {0}")]
    EnvFile(String),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Failed to connect: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("State store error: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("{0}")]
    Progress(#[from] ProgressError),

    #[error("Batched job failed: {0}")]
    Job(#[from] JobError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
