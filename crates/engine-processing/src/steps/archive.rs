use crate::{
    error::MutationError,
    step::{BatchScope, MutationStep},
};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::SqlAdapter, error::DbError, query::generator::ParamList, statement::Statement,
};
use engine_config::settings::ArchiveRowsConfig;
use model::{
    core::identifiers::{ColumnRef, TableRef},
    execution::{errors::ConfigurationError, spec::BatchSpec},
};

const SOURCE_ALIAS: &str = "src";

/// Moves matching rows of the window into an archive table in one statement.
///
/// Rows are deleted from the source and inserted into the archive with an
/// archival timestamp. Rows already present in the archive are not inserted
/// again, so a repeated window only deletes what is left behind.
#[derive(Debug, Clone)]
pub struct ArchiveRows {
    archive_table: TableRef,
    columns: Vec<ColumnRef>,
    condition: Option<String>,
    conflict_columns: Vec<ColumnRef>,
    archived_at: ColumnRef,
}

impl ArchiveRows {
    pub fn new(config: &ArchiveRowsConfig) -> Result<Self, ConfigurationError> {
        if config.columns.is_empty() {
            return Err(ConfigurationError::InvalidStep(
                "archive_rows needs at least one column".to_string(),
            ));
        }
        if config.conflict_columns.is_empty() {
            return Err(ConfigurationError::InvalidStep(
                "archive_rows needs conflict_columns".to_string(),
            ));
        }

        Ok(ArchiveRows {
            archive_table: config.archive_table.parse()?,
            columns: config.columns.iter().map(|c| ColumnRef::new(c.as_str())).collect(),
            condition: config
                .condition
                .as_ref()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            conflict_columns: config
                .conflict_columns
                .iter()
                .map(|c| ColumnRef::new(c.as_str()))
                .collect(),
            archived_at: ColumnRef::new(config.archived_at_column.as_str()),
        })
    }

    pub fn statement(&self, scope: &BatchScope<'_>) -> Result<Statement, DbError> {
        let mut params = ParamList::default();
        let predicate = scope.predicate(Some(SOURCE_ALIAS), &mut params)?;
        let filter = match &self.condition {
            Some(condition) => format!("({predicate}) AND ({condition})"),
            None => predicate,
        };

        let returning = self
            .columns
            .iter()
            .map(|c| c.qualified(Some(SOURCE_ALIAS)))
            .collect::<Vec<_>>()
            .join(", ");
        let columns = join_quoted(&self.columns);
        let conflict = join_quoted(&self.conflict_columns);

        let sql = format!(
            "WITH moved AS (DELETE FROM {source} AS {SOURCE_ALIAS} WHERE {filter} RETURNING {returning}) \
             INSERT INTO {archive} ({columns}, {archived_at}) \
             SELECT {columns}, NOW() FROM moved \
             ON CONFLICT ({conflict}) DO NOTHING",
            source = scope.table().quoted(),
            archive = self.archive_table.quoted(),
            archived_at = self.archived_at.quoted(),
        );
        Ok(Statement::new(sql, params.into_values()))
    }
}

fn join_quoted(columns: &[ColumnRef]) -> String {
    columns
        .iter()
        .map(ColumnRef::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl MutationStep for ArchiveRows {
    fn operation_name(&self) -> &str {
        "archive_rows"
    }

    fn validate(&self, spec: &BatchSpec) -> Result<(), ConfigurationError> {
        if self.archive_table.may_refer_to(spec.table()) {
            return Err(ConfigurationError::InvalidStep(
                "archive table must differ from the batched table".to_string(),
            ));
        }
        if self.columns.contains(&self.archived_at) {
            return Err(ConfigurationError::InvalidStep(format!(
                "column '{}' is reserved for the archival timestamp",
                self.archived_at
            )));
        }
        Ok(())
    }

    async fn apply(
        &self,
        store: &dyn SqlAdapter,
        scope: &BatchScope<'_>,
    ) -> Result<u64, MutationError> {
        let statement = self.statement(scope)?;
        Ok(store.exec_params(&statement.sql, statement.params).await?)
    }
}
