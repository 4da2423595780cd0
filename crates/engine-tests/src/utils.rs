#![allow(dead_code)]

use connectors::sql::{base::adapter::SqlAdapter, postgres::adapter::PgAdapter};
use engine_processing::{BatchedMigrationJob, JobReport, MutationStep, error::JobError};
use model::{
    core::{identifiers::TableRef, value::Value},
    execution::spec::BatchSpec,
    pagination::{cursor::KeyColumns, range::BatchRange},
    records::row::RowData,
};
use std::sync::Arc;

/// `users` with a name to copy and an empty destination column.
/// `{schema}` is replaced with the test's schema.
pub const USERS_TABLE_DDL: &str = r#"
    CREATE TABLE {schema}.users (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        display_name TEXT,
        score BIGINT
    );
    INSERT INTO {schema}.users (id, name)
    SELECT g, 'user-' || g FROM generate_series(1, 20) AS g;
"#;

/// OAuth grants revoked 3 months, 2 months and 1 week ago, plus one never revoked.
pub const GRANTS_TABLE_DDL: &str = r#"
    CREATE TABLE {schema}.oauth_access_grants (
        id BIGINT PRIMARY KEY,
        resource_owner_id BIGINT NOT NULL,
        token TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ
    );
    CREATE TABLE {schema}.oauth_access_grants_archived (
        id BIGINT PRIMARY KEY,
        resource_owner_id BIGINT NOT NULL,
        token TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ,
        archived_at TIMESTAMPTZ NOT NULL
    );
    INSERT INTO {schema}.oauth_access_grants VALUES
        (1, 10, 'token-1', NOW() - INTERVAL '1 year', NOW() - INTERVAL '3 months'),
        (2, 10, 'token-2', NOW() - INTERVAL '1 year', NOW() - INTERVAL '2 months'),
        (3, 11, 'token-3', NOW() - INTERVAL '1 year', NOW() - INTERVAL '1 week'),
        (4, 12, 'token-4', NOW() - INTERVAL '1 year', NULL);
"#;

/// Children with three nullable sharding columns, exactly one of which must end up set.
/// The check is added `NOT VALID` so the unfilled rows can exist before the backfill.
pub const SHARDING_TABLES_DDL: &str = r#"
    CREATE TABLE {schema}.parents (
        id BIGINT PRIMARY KEY,
        project_id BIGINT,
        group_id BIGINT,
        organization_id BIGINT
    );
    CREATE TABLE {schema}.children (
        id BIGINT PRIMARY KEY,
        parent_id BIGINT,
        project_id BIGINT,
        group_id BIGINT,
        organization_id BIGINT
    );
    INSERT INTO {schema}.parents VALUES
        (1, 70, 8, 1),
        (2, NULL, 9, 1),
        (3, NULL, NULL, 5),
        (4, NULL, NULL, NULL);
    INSERT INTO {schema}.children (id, parent_id) VALUES (1, 1), (2, 2), (3, 3), (4, 4), (5, NULL);
    -- NOT VALID skips the rows above but still checks later writes
    ALTER TABLE {schema}.children ADD CONSTRAINT one_sharding_key
        CHECK (num_nonnulls(project_id, group_id, organization_id) = 1) NOT VALID;
"#;

/// Package files pointing at a deduplicated reference table.
pub const CONAN_TABLES_DDL: &str = r#"
    CREATE TABLE {schema}.conan_package_references (
        id BIGSERIAL PRIMARY KEY,
        project_id BIGINT NOT NULL,
        reference_hash TEXT NOT NULL,
        UNIQUE (project_id, reference_hash)
    );
    CREATE TABLE {schema}.conan_package_files (
        id BIGINT PRIMARY KEY,
        project_id BIGINT NOT NULL,
        reference_hash TEXT NOT NULL,
        package_reference_id BIGINT REFERENCES {schema}.conan_package_references (id)
    );
    INSERT INTO {schema}.conan_package_files (id, project_id, reference_hash) VALUES
        (1, 10, 'abc'),
        (2, 10, 'abc'),
        (3, 10, 'def'),
        (4, 11, 'abc');
"#;

/// Partitioned builds keyed by `(partition_id, id)`.
pub const BUILDS_TABLE_DDL: &str = r#"
    CREATE TABLE {schema}.p_ci_builds (
        partition_id BIGINT NOT NULL,
        id BIGINT NOT NULL,
        visits BIGINT NOT NULL DEFAULT 0,
        PRIMARY KEY (partition_id, id)
    );
    INSERT INTO {schema}.p_ci_builds (partition_id, id)
    SELECT p, i FROM generate_series(100, 102) AS p, generate_series(1, 4) AS i;
"#;

pub fn ddl(template: &str, schema: &str) -> String {
    template.replace("{schema}", schema)
}

pub async fn execute(adapter: &PgAdapter, sql: &str) {
    adapter.exec(sql).await.expect("execute statement");
}

pub async fn fetch_rows(adapter: &PgAdapter, sql: &str) -> Vec<RowData> {
    adapter
        .query_rows(sql, Vec::new())
        .await
        .expect("fetch rows")
}

pub async fn get_row_count(adapter: &PgAdapter, table: &str) -> i64 {
    let rows = fetch_rows(adapter, &format!("SELECT COUNT(*)::bigint AS n FROM {table}")).await;
    rows.first()
        .and_then(|row| row.get_value("n").as_i64())
        .expect("row count")
}

pub async fn get_cell(adapter: &PgAdapter, sql: &str, column: &str) -> Value {
    fetch_rows(adapter, sql)
        .await
        .first()
        .map(|row| row.get_value(column))
        .unwrap_or(Value::Null)
}

pub fn spec(schema: &str, table: &str, columns: KeyColumns, size: i64) -> BatchSpec {
    BatchSpec::builder(TableRef::qualified(schema, table), columns)
        .sub_batch_size(size)
        .build()
        .expect("valid batch spec")
}

/// Runs `step` over `range` against Postgres with a fresh job instance.
pub async fn run_job(
    adapter: &PgAdapter,
    range: BatchRange,
    spec: BatchSpec,
    step: Arc<dyn MutationStep>,
) -> Result<JobReport, JobError> {
    let store: Arc<dyn SqlAdapter> = Arc::new(adapter.clone());
    BatchedMigrationJob::<dyn SqlAdapter>::new(store, range, spec, step)?
        .perform()
        .await
}
