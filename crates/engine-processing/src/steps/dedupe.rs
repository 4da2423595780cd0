use crate::{
    error::MutationError,
    step::{BatchScope, MutationStep},
};
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::SqlAdapter, error::DbError, query::generator::ParamList, statement::Statement,
};
use engine_config::settings::DeduplicateReferencesConfig;
use model::{
    core::identifiers::{ColumnRef, TableRef},
    execution::{errors::ConfigurationError, spec::BatchSpec},
};

const ROW_ALIAS: &str = "s";
const REF_ALIAS: &str = "r";

/// Creates one reference row per `(owner, hash)` found in the window and
/// points every source row at it.
///
/// The reference table needs a unique index on `(owner, hash)`; both
/// statements run in one transaction.
#[derive(Debug, Clone)]
pub struct DeduplicateReferences {
    reference_table: TableRef,
    reference_id: ColumnRef,
    reference_owner: ColumnRef,
    reference_hash: ColumnRef,
    owner: ColumnRef,
    hash: ColumnRef,
    reference: ColumnRef,
}

impl DeduplicateReferences {
    pub fn new(config: &DeduplicateReferencesConfig) -> Result<Self, ConfigurationError> {
        Ok(DeduplicateReferences {
            reference_table: config.reference_table.parse()?,
            reference_id: ColumnRef::new(config.reference_id_column.as_str()),
            reference_owner: ColumnRef::new(config.reference_owner_column.as_str()),
            reference_hash: ColumnRef::new(config.reference_hash_column.as_str()),
            owner: ColumnRef::new(config.owner_column.as_str()),
            hash: ColumnRef::new(config.hash_column.as_str()),
            reference: ColumnRef::new(config.reference_column.as_str()),
        })
    }

    fn pending(&self, scope: &BatchScope<'_>, params: &mut ParamList) -> Result<String, DbError> {
        let predicate = scope.predicate(Some(ROW_ALIAS), params)?;
        Ok(format!(
            "({predicate}) AND {} IS NULL AND {} IS NOT NULL AND {} IS NOT NULL",
            self.reference.qualified(Some(ROW_ALIAS)),
            self.owner.qualified(Some(ROW_ALIAS)),
            self.hash.qualified(Some(ROW_ALIAS)),
        ))
    }

    pub fn statements(&self, scope: &BatchScope<'_>) -> Result<Vec<Statement>, DbError> {
        let source = scope.table().quoted();
        let reference_table = self.reference_table.quoted();
        let owner = self.owner.qualified(Some(ROW_ALIAS));
        let hash = self.hash.qualified(Some(ROW_ALIAS));

        let mut insert_params = ParamList::default();
        let pending = self.pending(scope, &mut insert_params)?;
        let insert = format!(
            "INSERT INTO {reference_table} ({ref_owner}, {ref_hash}) \
             SELECT DISTINCT {owner}, {hash} FROM {source} AS {ROW_ALIAS} WHERE {pending} \
             ON CONFLICT ({ref_owner}, {ref_hash}) DO NOTHING",
            ref_owner = self.reference_owner.quoted(),
            ref_hash = self.reference_hash.quoted(),
        );

        let mut update_params = ParamList::default();
        let pending = self.pending(scope, &mut update_params)?;
        let update = format!(
            "UPDATE {source} AS {ROW_ALIAS} SET {reference} = {ref_id} \
             FROM {reference_table} AS {REF_ALIAS} \
             WHERE {pending} AND {ref_owner} = {owner} AND {ref_hash} = {hash}",
            reference = self.reference.quoted(),
            ref_id = self.reference_id.qualified(Some(REF_ALIAS)),
            ref_owner = self.reference_owner.qualified(Some(REF_ALIAS)),
            ref_hash = self.reference_hash.qualified(Some(REF_ALIAS)),
        );

        Ok(vec![
            Statement::new(insert, insert_params.into_values()),
            Statement::new(update, update_params.into_values()),
        ])
    }
}

#[async_trait]
impl MutationStep for DeduplicateReferences {
    fn operation_name(&self) -> &str {
        "deduplicate_references"
    }

    fn validate(&self, spec: &BatchSpec) -> Result<(), ConfigurationError> {
        if self.reference_table.may_refer_to(spec.table()) {
            return Err(ConfigurationError::InvalidStep(
                "reference table must differ from the batched table".to_string(),
            ));
        }
        Ok(())
    }

    async fn apply(
        &self,
        store: &dyn SqlAdapter,
        scope: &BatchScope<'_>,
    ) -> Result<u64, MutationError> {
        Ok(store.exec_atomic(self.statements(scope)?).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingAdapter;
    use model::{
        pagination::cursor::{Key, KeyColumns},
        records::batch::SubBatch,
    };
    use std::sync::atomic::Ordering;

    fn step() -> DeduplicateReferences {
        DeduplicateReferences::new(&DeduplicateReferencesConfig {
            reference_table: "packages_conan_package_references".into(),
            reference_id_column: "id".into(),
            reference_owner_column: "package_id".into(),
            reference_hash_column: "reference".into(),
            owner_column: "package_id".into(),
            hash_column: "conan_package_reference".into(),
            reference_column: "package_reference_id".into(),
        })
        .unwrap()
    }

    fn spec() -> BatchSpec {
        BatchSpec::builder(TableRef::new("packages_conan_file_metadata"), KeyColumns::single("id"))
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_the_batched_table_as_reference_table() {
        assert!(step().validate(&spec()).is_ok());

        let step = DeduplicateReferences::new(&DeduplicateReferencesConfig {
            reference_table: "public.packages_conan_file_metadata".into(),
            reference_id_column: "id".into(),
            reference_owner_column: "package_id".into(),
            reference_hash_column: "reference".into(),
            owner_column: "package_id".into(),
            hash_column: "conan_package_reference".into(),
            reference_column: "package_reference_id".into(),
        })
        .unwrap();
        assert!(matches!(
            step.validate(&spec()),
            Err(ConfigurationError::InvalidStep(_))
        ));
    }

    #[test]
    fn inserts_distinct_references_then_links_rows() {
        let spec = spec();
        let window = SubBatch::new(0, Key::Scalar(1), Key::Scalar(9));
        let statements = step().statements(&BatchScope::new(&spec, &window)).unwrap();

        assert_eq!(
            statements[0].sql,
            "INSERT INTO \"packages_conan_package_references\" (\"package_id\", \"reference\") \
             SELECT DISTINCT s.\"package_id\", s.\"conan_package_reference\" \
             FROM \"packages_conan_file_metadata\" AS s \
             WHERE (s.\"id\" BETWEEN $1::bigint AND $2::bigint) \
             AND s.\"package_reference_id\" IS NULL AND s.\"package_id\" IS NOT NULL \
             AND s.\"conan_package_reference\" IS NOT NULL \
             ON CONFLICT (\"package_id\", \"reference\") DO NOTHING"
        );
        assert!(statements[1].sql.starts_with(
            "UPDATE \"packages_conan_file_metadata\" AS s SET \"package_reference_id\" = r.\"id\" \
             FROM \"packages_conan_package_references\" AS r"
        ));
        assert!(statements[1].sql.ends_with(
            "AND r.\"package_id\" = s.\"package_id\" AND r.\"reference\" = s.\"conan_package_reference\""
        ));
        assert_eq!(statements[1].params.len(), 2);
    }

    #[tokio::test]
    async fn runs_both_statements_in_one_transaction() {
        let adapter = RecordingAdapter::with_columns(&[]);
        let store: &dyn SqlAdapter = &adapter;
        let spec = spec();
        let window = SubBatch::new(0, Key::Scalar(1), Key::Scalar(9));

        step().apply(store, &BatchScope::new(&spec, &window)).await.unwrap();
        assert_eq!(adapter.transactions.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.statements().len(), 2);
    }
}
