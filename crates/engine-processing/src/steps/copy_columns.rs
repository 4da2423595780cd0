use crate::{
    error::MutationError,
    step::{BatchScope, MutationStep},
};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::SqlAdapter, error::DbError, query::generator::ParamList, statement::Statement,
};
use model::{
    core::identifiers::ColumnRef,
    execution::{arguments::JobArguments, errors::ConfigurationError, spec::BatchSpec},
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Copies `source` into `destination` for every pair, only where they differ.
#[derive(Debug)]
pub struct CopyColumns {
    pairs: Vec<(ColumnRef, ColumnRef)>,
    present: OnceCell<Vec<(ColumnRef, ColumnRef)>>,
}

impl CopyColumns {
    pub fn new(sources: Vec<String>, destinations: Vec<String>) -> Result<Self, ConfigurationError> {
        if sources.len() != destinations.len() {
            return Err(ConfigurationError::MismatchedColumnPairs {
                sources: sources.len(),
                destinations: destinations.len(),
            });
        }
        if sources.is_empty() {
            return Err(ConfigurationError::InvalidStep(
                "copy_columns needs at least one column pair".to_string(),
            ));
        }

        let pairs = sources
            .into_iter()
            .zip(destinations)
            .map(|(src, dst)| (ColumnRef::new(src), ColumnRef::new(dst)))
            .collect();
        Ok(CopyColumns {
            pairs,
            present: OnceCell::new(),
        })
    }

    /// Reads sources from argument 0 and destinations from argument 1.
    pub fn from_arguments(arguments: &JobArguments) -> Result<Self, ConfigurationError> {
        Self::new(arguments.column_list(0)?, arguments.column_list(1)?)
    }

    pub fn pairs(&self) -> &[(ColumnRef, ColumnRef)] {
        &self.pairs
    }

    /// Pairs whose columns both exist, looked up once per job.
    async fn present_pairs(
        &self,
        store: &dyn SqlAdapter,
        scope: &BatchScope<'_>,
    ) -> Result<&[(ColumnRef, ColumnRef)], DbError> {
        let present = self
            .present
            .get_or_try_init(|| async {
                let columns = store.table_columns(scope.table()).await?;
                let exists = |column: &ColumnRef| columns.iter().any(|c| c == column.name());

                let kept = self
                    .pairs
                    .iter()
                    .filter(|(src, dst)| {
                        let ok = exists(src) && exists(dst);
                        if !ok {
                            warn!(
                                table = %scope.table(),
                                source = %src,
                                destination = %dst,
                                "Skipping column pair, column missing"
                            );
                        }
                        ok
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                Ok::<_, DbError>(kept)
            })
            .await?;
        Ok(present)
    }

    pub fn statement(
        pairs: &[(ColumnRef, ColumnRef)],
        scope: &BatchScope<'_>,
    ) -> Result<Statement, DbError> {
        let mut params = ParamList::default();
        let predicate = scope.predicate(None, &mut params)?;

        let assignments = pairs
            .iter()
            .map(|(src, dst)| format!("{} = {}", dst.quoted(), src.quoted()))
            .collect::<Vec<_>>()
            .join(", ");
        let changed = pairs
            .iter()
            .map(|(src, dst)| format!("{} IS DISTINCT FROM {}", dst.quoted(), src.quoted()))
            .collect::<Vec<_>>()
            .join(" OR ");

        let sql = format!(
            "UPDATE {} SET {assignments} WHERE ({predicate}) AND ({changed})",
            scope.table().quoted()
        );
        Ok(Statement::new(sql, params.into_values()))
    }
}

#[async_trait]
impl MutationStep for CopyColumns {
    fn validate(&self, spec: &BatchSpec) -> Result<(), ConfigurationError> {
        let keys = spec.key_columns().columns();
        if let Some((_, dst)) = self.pairs.iter().find(|(_, dst)| keys.contains(dst)) {
            return Err(ConfigurationError::InvalidStep(format!(
                "copy_columns cannot overwrite batch column '{dst}'"
            )));
        }
        Ok(())
    }

    async fn apply(
        &self,
        store: &dyn SqlAdapter,
        scope: &BatchScope<'_>,
    ) -> Result<u64, MutationError> {
        let pairs = self.present_pairs(store, scope).await?;
        if pairs.is_empty() {
            debug!(window = %scope.window(), "No column pair left to copy");
            return Ok(0);
        }

        let statement = Self::statement(pairs, scope)?;
        Ok(store.exec_params(&statement.sql, statement.params).await?)
    }
}
