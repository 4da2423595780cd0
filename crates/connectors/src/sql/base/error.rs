use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Low-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// PostgreSQL driver error, kept intact so callers can inspect the SQLSTATE.
    #[error("PostgreSQL error: {0}")]
    PgError(#[from] tokio_postgres::Error),

    /// A statement was rejected by a non-SQL store (e.g. a constraint in the memory store).
    #[error("Write error: {0}")]
    Write(String),

    /// An error occurred while building a SQL query.
    #[error("Query build error: {0}")]
    QueryBuildError(String),

    /// A key column returned something other than an integer.
    #[error("Unsupported key value in column '{column}': {message}")]
    UnsupportedKey { column: String, message: String },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors happening during adapter or connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("PostgreSQL connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] native_tls::Error),
}
