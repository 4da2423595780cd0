use crate::{
    error::MutationError,
    step::{BatchScope, MutationStep},
};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::SqlAdapter, error::DbError, query::generator::ParamList, statement::Statement,
};
use engine_config::settings::ShardingKeyConfig;
use model::{
    core::{
        identifiers::{ColumnRef, TableRef},
        value::Value,
    },
    execution::{errors::ConfigurationError, spec::BatchSpec},
};

const ROW_ALIAS: &str = "c";
const PARENT_ALIAS: &str = "p";

#[derive(Debug, Clone)]
struct Source {
    column: ColumnRef,
    foreign_key: ColumnRef,
    parent_table: TableRef,
    parent_key: ColumnRef,
    parent_column: ColumnRef,
}

impl Source {
    fn lookup(&self) -> String {
        format!(
            "(SELECT {p_col} FROM {parent} AS {PARENT_ALIAS} WHERE {p_key} = {fk} ORDER BY {p_key} LIMIT 1)",
            p_col = self.parent_column.qualified(Some(PARENT_ALIAS)),
            parent = self.parent_table.quoted(),
            p_key = self.parent_key.qualified(Some(PARENT_ALIAS)),
            fk = self.foreign_key.qualified(Some(ROW_ALIAS)),
        )
    }
}

/// Fills exactly one sharding column of rows that have none yet.
///
/// Sources are tried in order; the first one whose parent row yields a value
/// decides which column is set. The optional fallback applies when no source
/// yields anything. Rows with any sharding column already set are left alone.
#[derive(Debug, Clone)]
pub struct ShardingKeyBackfill {
    sources: Vec<Source>,
    columns: Vec<ColumnRef>,
    fallback: Option<(ColumnRef, i64)>,
}

impl ShardingKeyBackfill {
    pub fn new(config: &ShardingKeyConfig) -> Result<Self, ConfigurationError> {
        if config.targets.is_empty() {
            return Err(ConfigurationError::InvalidStep(
                "sharding_key needs at least one target".to_string(),
            ));
        }

        let sources = config
            .targets
            .iter()
            .map(|target| {
                Ok(Source {
                    column: ColumnRef::new(target.column.as_str()),
                    foreign_key: ColumnRef::new(target.foreign_key.as_str()),
                    parent_table: target.parent_table.parse()?,
                    parent_key: ColumnRef::new(target.parent_key.as_str()),
                    parent_column: ColumnRef::new(target.parent_column.as_str()),
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let mut columns: Vec<ColumnRef> = Vec::new();
        for source in &sources {
            if !columns.contains(&source.column) {
                columns.push(source.column.clone());
            }
        }

        let fallback = match &config.fallback {
            Some(fallback) => {
                let column = ColumnRef::new(fallback.column.as_str());
                if !columns.contains(&column) {
                    return Err(ConfigurationError::InvalidStep(format!(
                        "sharding_key fallback column '{column}' is not one of the targets"
                    )));
                }
                Some((column, fallback.value))
            }
            None => None,
        };

        Ok(ShardingKeyBackfill {
            sources,
            columns,
            fallback,
        })
    }

    pub fn statement(&self, scope: &BatchScope<'_>) -> Result<Statement, DbError> {
        let mut params = ParamList::default();
        let predicate = scope.predicate(Some(ROW_ALIAS), &mut params)?;
        let fallback = self
            .fallback
            .as_ref()
            .map(|(column, value)| (column, format!("{}::bigint", params.bind(Value::Int(*value)))));

        let lookups: Vec<String> = self.sources.iter().map(Source::lookup).collect();

        let assignments = self
            .columns
            .iter()
            .map(|column| {
                let arms = self
                    .sources
                    .iter()
                    .zip(&lookups)
                    .map(|(source, lookup)| {
                        let value = if &source.column == column {
                            lookup.as_str()
                        } else {
                            "NULL"
                        };
                        format!("WHEN {lookup} IS NOT NULL THEN {value}")
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                let otherwise = match &fallback {
                    Some((fallback_column, placeholder)) if *fallback_column == column => {
                        placeholder.as_str()
                    }
                    _ => "NULL",
                };
                format!("{} = CASE {arms} ELSE {otherwise} END", column.quoted())
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut conditions = vec![format!("({predicate})")];
        conditions.extend(
            self.columns
                .iter()
                .map(|c| format!("{} IS NULL", c.qualified(Some(ROW_ALIAS)))),
        );
        if fallback.is_none() {
            let derivable = lookups
                .iter()
                .map(|lookup| format!("{lookup} IS NOT NULL"))
                .collect::<Vec<_>>()
                .join(" OR ");
            conditions.push(format!("({derivable})"));
        }

        let sql = format!(
            "UPDATE {} AS {ROW_ALIAS} SET {assignments} WHERE {}",
            scope.table().quoted(),
            conditions.join(" AND ")
        );
        Ok(Statement::new(sql, params.into_values()))
    }
}

#[async_trait]
impl MutationStep for ShardingKeyBackfill {
    fn validate(&self, spec: &BatchSpec) -> Result<(), ConfigurationError> {
        let keys = spec.key_columns().columns();
        match self.columns.iter().find(|c| keys.contains(c)) {
            Some(column) => Err(ConfigurationError::InvalidStep(format!(
                "sharding column '{column}' is also a batch column"
            ))),
            None => Ok(()),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::settings::{ShardingFallback, ShardingTarget};
    use model::{
        pagination::cursor::{Key, KeyColumns},
        records::batch::SubBatch,
    };

    fn target(column: &str, foreign_key: &str, parent: &str, parent_column: &str) -> ShardingTarget {
        ShardingTarget {
            column: column.into(),
            foreign_key: foreign_key.into(),
            parent_table: parent.into(),
            parent_key: "id".into(),
            parent_column: parent_column.into(),
        }
    }

    fn render(config: &ShardingKeyConfig) -> Statement {
        let spec = BatchSpec::builder(TableRef::new("pool_repositories"), KeyColumns::single("id"))
            .build()
            .unwrap();
        let window = SubBatch::new(0, Key::Scalar(1), Key::Scalar(100));
        ShardingKeyBackfill::new(config)
            .unwrap()
            .statement(&BatchScope::new(&spec, &window))
            .unwrap()
    }

    #[test]
    fn sets_one_column_from_the_first_available_parent() {
        let statement = render(&ShardingKeyConfig {
            targets: vec![
                target("project_id", "source_project_id", "projects", "id"),
                target("organization_id", "shard_id", "shards", "organization_id"),
            ],
            fallback: None,
        });

        let project = "(SELECT p.\"id\" FROM \"projects\" AS p WHERE p.\"id\" = c.\"source_project_id\" ORDER BY p.\"id\" LIMIT 1)";
        let org = "(SELECT p.\"organization_id\" FROM \"shards\" AS p WHERE p.\"id\" = c.\"shard_id\" ORDER BY p.\"id\" LIMIT 1)";
        assert_eq!(
            statement.sql,
            format!(
                "UPDATE \"pool_repositories\" AS c SET \
                 \"project_id\" = CASE WHEN {project} IS NOT NULL THEN {project} \
                 WHEN {org} IS NOT NULL THEN NULL ELSE NULL END, \
                 \"organization_id\" = CASE WHEN {project} IS NOT NULL THEN NULL \
                 WHEN {org} IS NOT NULL THEN {org} ELSE NULL END \
                 WHERE (c.\"id\" BETWEEN $1::bigint AND $2::bigint) \
                 AND c.\"project_id\" IS NULL AND c.\"organization_id\" IS NULL \
                 AND ({project} IS NOT NULL OR {org} IS NOT NULL)"
            )
        );
        assert_eq!(statement.params, vec![Value::Int(1), Value::Int(100)]);
    }

    #[test]
    fn fallback_fills_rows_without_a_parent() {
        let statement = render(&ShardingKeyConfig {
            targets: vec![
                target("project_id", "project_id_source", "projects", "id"),
                target("organization_id", "namespace_id", "namespaces", "organization_id"),
            ],
            fallback: Some(ShardingFallback {
                column: "organization_id".into(),
                value: 1,
            }),
        });

        assert!(statement.sql.contains("ELSE $3::bigint END WHERE"));
        assert!(!statement.sql.contains(" OR "));
        assert_eq!(statement.params[2], Value::Int(1));
    }

    #[test]
    fn rejects_unknown_fallback_column() {
        let result = ShardingKeyBackfill::new(&ShardingKeyConfig {
            targets: vec![target("project_id", "source_project_id", "projects", "id")],
            fallback: Some(ShardingFallback {
                column: "group_id".into(),
                value: 1,
            }),
        });
        assert!(matches!(result, Err(ConfigurationError::InvalidStep(_))));
    }
}
