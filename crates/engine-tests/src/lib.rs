#![allow(dead_code)]

use connectors::sql::postgres::adapter::PgAdapter;
use std::{
    env,
    sync::atomic::{AtomicUsize, Ordering},
};
use tracing::warn;

pub mod memory;
pub mod scenarios;
pub mod utils;

/// Points the Postgres-backed tests at a disposable database.
const TEST_PG_URL_VAR: &str = "BACKFILL_TEST_PG_URL";

fn test_pg_url() -> Option<String> {
    env::var(TEST_PG_URL_VAR).ok().filter(|url| !url.is_empty())
}

/// Connects to the test database, or returns `None` when it is not configured.
async fn pg_adapter() -> Option<PgAdapter> {
    let Some(url) = test_pg_url() else {
        warn!("{TEST_PG_URL_VAR} is not set, skipping Postgres test");
        return None;
    };
    Some(PgAdapter::connect(&url).await.expect("connect postgres"))
}

static SCHEMA_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Drop & recreate a schema private to the calling test so tests can run in parallel.
async fn fresh_schema(adapter: &PgAdapter, prefix: &str) -> String {
    use connectors::sql::base::adapter::SqlAdapter;

    let schema = format!(
        "backfill_{prefix}_{}_{}",
        std::process::id(),
        SCHEMA_SEQ.fetch_add(1, Ordering::SeqCst)
    );
    adapter
        .exec(&format!(
            "DROP SCHEMA IF EXISTS {schema} CASCADE; CREATE SCHEMA {schema};"
        ))
        .await
        .expect("reset postgres schema");
    schema
}
