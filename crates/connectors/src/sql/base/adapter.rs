use crate::sql::base::{error::DbError, probe::KeyProbe, statement::Statement};
use async_trait::async_trait;
use model::{core::identifiers::TableRef, core::value::Value, records::row::RowData};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Other(String),
}

/// Connection handle consumed by jobs and SQL mutation steps.
#[async_trait]
pub trait SqlAdapter: KeyProbe {
    async fn exec(&self, query: &str) -> Result<(), DbError>;

    /// Executes one statement and returns the number of rows it affected.
    async fn exec_params(&self, query: &str, params: Vec<Value>) -> Result<u64, DbError>;

    /// Executes all statements in a single transaction.
    ///
    /// Either every statement commits or none does; the summed row count is returned.
    async fn exec_atomic(&self, statements: Vec<Statement>) -> Result<u64, DbError>;

    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError>;

    // Introspection
    async fn table_exists(&self, table: &TableRef) -> Result<bool, DbError>;
    async fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, DbError>;

    fn kind(&self) -> DatabaseKind;
}
