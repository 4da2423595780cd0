use crate::sql::{
    base::{
        adapter::{DatabaseKind, SqlAdapter},
        error::{ConnectorError, DbError},
        probe::KeyProbe,
        query::generator::QueryGenerator,
        statement::Statement,
    },
    postgres::{params::PgParamStore, row::to_row_data, utils::connect_client},
};
use async_trait::async_trait;
use model::{
    core::{identifiers::TableRef, value::Value},
    pagination::{
        cursor::{Key, KeyColumns},
        range::BatchRange,
    },
    records::row::RowData,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{Client, Row};
use tracing::debug;

const QUERY_TABLE_EXISTS_SQL: &str = include_str!("sql/table_exists.sql");
const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");

#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
}

impl PgAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        Ok(Self::from_client(connect_client(url).await?))
    }

    pub fn from_client(client: Client) -> Self {
        PgAdapter {
            client: Arc::new(RwLock::new(client)),
        }
    }

    async fn query(&self, statement: Statement) -> Result<Vec<Row>, DbError> {
        let bindings = PgParamStore::from_values(statement.params);
        let client = self.client.read().await;
        Ok(client.query(&statement.sql, &bindings.as_refs()).await?)
    }

    /// Reads the `k0..kn` bigint columns of a key probe row.
    fn read_key(row: &Row, columns: &KeyColumns) -> Result<Key, DbError> {
        let parts = columns
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                row.try_get::<_, i64>(idx)
                    .map_err(|err| DbError::UnsupportedKey {
                        column: column.name().to_string(),
                        message: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Key::from_components(parts))
    }

    fn first_and_last(rows: &[Row], columns: &KeyColumns) -> Result<Option<(Key, Key)>, DbError> {
        match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => Ok(Some((
                Self::read_key(first, columns)?,
                Self::read_key(last, columns)?,
            ))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl KeyProbe for PgAdapter {
    async fn key_bounds(
        &self,
        table: &TableRef,
        columns: &KeyColumns,
    ) -> Result<Option<BatchRange>, DbError> {
        let rows = self.query(QueryGenerator::key_bounds(table, columns)).await?;
        Ok(Self::first_and_last(&rows, columns)?.map(|(start, end)| BatchRange { start, end }))
    }

    async fn next_window(
        &self,
        table: &TableRef,
        columns: &KeyColumns,
        range: &BatchRange,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Option<(Key, Key)>, DbError> {
        let statement = QueryGenerator::key_window(table, columns, range, after, limit)?;
        let rows = self.query(statement).await?;
        Self::first_and_last(&rows, columns)
    }
}

#[async_trait]
impl SqlAdapter for PgAdapter {
    async fn exec(&self, query: &str) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.batch_execute(query).await?;
        Ok(())
    }

    async fn exec_params(&self, query: &str, params: Vec<Value>) -> Result<u64, DbError> {
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        Ok(client.execute(query, &bindings.as_refs()).await?)
    }

    async fn exec_atomic(&self, statements: Vec<Statement>) -> Result<u64, DbError> {
        let mut client = self.client.write().await;
        let tx = client.transaction().await?;

        let mut affected = 0;
        for statement in statements {
            debug!(sql = %statement.sql, params = statement.params.len(), "Executing in transaction");
            let bindings = PgParamStore::from_values(statement.params);
            // Dropping `tx` on error rolls the transaction back.
            affected += tx.execute(&statement.sql, &bindings.as_refs()).await?;
        }

        tx.commit().await?;
        Ok(affected)
    }

    async fn query_rows(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        let rows = self.query(Statement::new(sql, params)).await?;
        Ok(rows.iter().map(|row| to_row_data(row, "")).collect())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, DbError> {
        let client = self.client.read().await;
        let row = client
            .query_one(QUERY_TABLE_EXISTS_SQL, &[&table.schema, &table.name])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn table_columns(&self, table: &TableRef) -> Result<Vec<String>, DbError> {
        let client = self.client.read().await;
        let rows = client
            .query(QUERY_TABLE_COLUMNS_SQL, &[&table.schema, &table.name])
            .await?;
        let columns = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }
}
