use thiserror::Error;

/// Malformed job parameters. Raised before any data is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("sub_batch_size must be positive, got {0}")]
    NonPositiveSubBatchSize(i64),

    #[error("at least one batch column is required")]
    EmptyKeyColumns,

    #[error("key {key} has {found} component(s) but the batch uses {expected} column(s)")]
    KeyArity {
        key: String,
        expected: usize,
        found: usize,
    },

    #[error("arithmetic slicing needs a single integer batch column")]
    ArithmeticCompositeKey,

    #[error("invalid table name: '{0}'")]
    InvalidTableName(String),

    #[error("{sources} source column(s) cannot be paired with {destinations} destination column(s)")]
    MismatchedColumnPairs { sources: usize, destinations: usize },

    #[error("job argument {index}: {message}")]
    InvalidArgument { index: usize, message: String },

    #[error("invalid step configuration: {0}")]
    InvalidStep(String),
}
