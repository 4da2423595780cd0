use connectors::sql::base::error::DbError;
use model::execution::errors::ConfigurationError;
use thiserror::Error;

/// Errors raised while loading or validating a job document.
#[derive(Debug, Error)]
pub enum JobConfigError {
    #[error("Failed to read job file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A `${VAR}` reference could not be resolved.
    #[error("Environment variable '{0}' is not set")]
    MissingVariable(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Database error while validating job: {0}")]
    Database(#[from] DbError),

    #[error("Table {0} does not exist")]
    MissingTable(String),

    #[error("Batch column '{column}' not found on table {table}")]
    MissingKeyColumn { table: String, column: String },

    #[error("Job validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}
