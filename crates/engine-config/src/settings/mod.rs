use crate::settings::error::JobConfigError;
use engine_core::{
    context::env::{EnvContext, Environment},
    retry::RetryPolicy,
};
use model::pagination::cursor::{CursorStrategy, Key, KeyColumns};
use serde::Deserialize;
use std::path::Path;

pub mod error;
pub mod validated;
pub mod validator;

fn default_sub_batch_size() -> i64 {
    100
}

/// A batched backfill job as written in a JSON job file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobConfig {
    /// Unique job name, also the checkpoint key.
    pub name: String,
    /// Postgres URL; `${VAR}` references are expanded from the environment.
    pub connection: String,
    /// `table` or `schema.table`.
    pub table: String,
    pub batch_column: KeyColumns,
    #[serde(default)]
    pub start: Option<Key>,
    #[serde(default)]
    pub end: Option<Key>,
    #[serde(default = "default_sub_batch_size")]
    pub sub_batch_size: i64,
    #[serde(default)]
    pub pause_ms: i64,
    #[serde(default)]
    pub strategy: CursorStrategy,
    #[serde(default)]
    pub job_arguments: Vec<serde_json::Value>,
    pub step: StepConfig,
    #[serde(default)]
    pub only_if: Option<GateConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl JobConfig {
    pub fn from_json(json: &str) -> Result<Self, JobConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, JobConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| JobConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The connection URL with `${VAR}` references resolved against `env`.
    pub fn connection_url(&self, env: &EnvContext) -> Result<String, JobConfigError> {
        env.expand(&self.connection)
            .map_err(JobConfigError::MissingVariable)
    }
}

/// The mutation applied to every sub-batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    CopyColumns(CopyColumnsConfig),
    ArchiveRows(ArchiveRowsConfig),
    ShardingKey(ShardingKeyConfig),
    DeduplicateReferences(DeduplicateReferencesConfig),
    Sql(SqlStepConfig),
}

impl StepConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            StepConfig::CopyColumns(_) => "copy_columns",
            StepConfig::ArchiveRows(_) => "archive_rows",
            StepConfig::ShardingKey(_) => "sharding_key",
            StepConfig::DeduplicateReferences(_) => "deduplicate_references",
            StepConfig::Sql(_) => "sql",
        }
    }
}

/// Column pairs to copy. When both lists are empty the pairs come from
/// `job_arguments[0]` (sources) and `job_arguments[1]` (destinations).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CopyColumnsConfig {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
}

fn default_conflict_columns() -> Vec<String> {
    vec!["id".to_string()]
}

fn default_archived_at_column() -> String {
    "archived_at".to_string()
}

fn default_id_column() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArchiveRowsConfig {
    pub archive_table: String,
    /// Columns copied verbatim into the archive table.
    pub columns: Vec<String>,
    /// Extra SQL predicate selecting the rows to move, e.g. `revoked_at < NOW() - INTERVAL '1 month'`.
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default = "default_conflict_columns")]
    pub conflict_columns: Vec<String>,
    #[serde(default = "default_archived_at_column")]
    pub archived_at_column: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShardingKeyConfig {
    /// Candidate sharding columns in priority order.
    pub targets: Vec<ShardingTarget>,
    #[serde(default)]
    pub fallback: Option<ShardingFallback>,
}

/// Fills `column` with `parent_table.parent_column` of the row referenced by `foreign_key`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShardingTarget {
    pub column: String,
    pub foreign_key: String,
    pub parent_table: String,
    #[serde(default = "default_id_column")]
    pub parent_key: String,
    pub parent_column: String,
}

/// Value used when no parent yields a sharding key (e.g. a default organization).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShardingFallback {
    pub column: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeduplicateReferencesConfig {
    pub reference_table: String,
    #[serde(default = "default_id_column")]
    pub reference_id_column: String,
    pub reference_owner_column: String,
    pub reference_hash_column: String,
    /// Owner column on the batched table.
    pub owner_column: String,
    /// Hash column on the batched table.
    pub hash_column: String,
    /// Column on the batched table that receives the reference id.
    pub reference_column: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqlStepConfig {
    pub statements: Vec<String>,
    #[serde(default)]
    pub operation: Option<String>,
}

/// Runs the step only when the deployment matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub saas: Option<bool>,
    #[serde(default)]
    pub feature: Option<String>,
}

impl GateConfig {
    pub fn is_empty(&self) -> bool {
        self.saas.is_none() && self.feature.is_none()
    }

    pub fn is_open(&self, env: &dyn Environment) -> bool {
        let saas_ok = self.saas.is_none_or(|saas| env.is_saas() == saas);
        let feature_ok = self
            .feature
            .as_deref()
            .is_none_or(|feature| env.feature_enabled(feature));
        saas_ok && feature_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::context::env::StaticEnvironment;

    const COPY_JOB: &str = r#"{
        "name": "copy-ci-builds-metadata",
        "connection": "postgres://${PGUSER}@localhost/main",
        "table": "public.ci_builds",
        "batch_column": "id",
        "start": 1,
        "end": 5000,
        "pause_ms": -9,
        "job_arguments": [["old_col"], ["new_col"]],
        "step": { "kind": "copy_columns" }
    }"#;

    #[test]
    fn parses_minimal_job_with_defaults() {
        let config = JobConfig::from_json(COPY_JOB).unwrap();
        assert_eq!(config.sub_batch_size, 100);
        assert_eq!(config.pause_ms, -9);
        assert_eq!(config.strategy, CursorStrategy::Keyset);
        assert_eq!(config.batch_column, KeyColumns::single("id"));
        assert_eq!(config.start, Some(Key::Scalar(1)));
        assert_eq!(config.step, StepConfig::CopyColumns(CopyColumnsConfig::default()));
        assert!(config.retry.is_none());
    }

    #[test]
    fn parses_composite_cursor_and_tagged_step() {
        let config = JobConfig::from_json(
            r#"{
                "name": "dedupe",
                "connection": "postgres://localhost/main",
                "table": "deployment_merge_requests",
                "batch_column": ["deployment_id", "merge_request_id"],
                "start": [1, 1],
                "step": {
                    "kind": "archive_rows",
                    "archive_table": "oauth_grants_archived",
                    "columns": ["id", "token"],
                    "condition": "revoked_at < NOW() - INTERVAL '1 month'"
                },
                "retry": { "max_attempts": 2 }
            }"#,
        )
        .unwrap();

        assert!(config.batch_column.is_composite());
        assert_eq!(config.start, Some(Key::Tuple(vec![1, 1])));
        assert_eq!(config.end, None);
        match &config.step {
            StepConfig::ArchiveRows(archive) => {
                assert_eq!(archive.conflict_columns, vec!["id".to_string()]);
                assert_eq!(archive.archived_at_column, "archived_at");
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(config.retry.map(|r| r.max_attempts), Some(2));
    }

    #[test]
    fn expands_connection_variables() {
        let config = JobConfig::from_json(COPY_JOB).unwrap();

        let mut env = EnvContext::empty();
        assert!(matches!(
            config.connection_url(&env),
            Err(JobConfigError::MissingVariable(name)) if name == "PGUSER"
        ));

        env.set("PGUSER", "backfill");
        assert_eq!(
            config.connection_url(&env).unwrap(),
            "postgres://backfill@localhost/main"
        );
    }

    #[test]
    fn gate_checks_saas_and_feature() {
        let gate = GateConfig {
            saas: Some(true),
            feature: Some("backfill_orgs".into()),
        };

        let saas = StaticEnvironment::new().saas(true);
        assert!(!gate.is_open(&saas));
        assert!(gate.is_open(&saas.clone().with_feature("backfill_orgs")));
        assert!(!gate.is_open(&StaticEnvironment::new().with_feature("backfill_orgs")));
        assert!(GateConfig::default().is_open(&StaticEnvironment::new()));
    }

    #[test]
    fn reads_job_file_and_names_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copy.json");
        std::fs::write(&path, COPY_JOB).unwrap();

        let config = JobConfig::from_file(&path).unwrap();
        assert_eq!(config.name, "copy-ci-builds-metadata");

        let missing = dir.path().join("missing.json");
        match JobConfig::from_file(&missing) {
            Err(JobConfigError::Read { path, .. }) => assert!(path.ends_with("missing.json")),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
