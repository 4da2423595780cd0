use crate::step::MutationStep;
use engine_config::settings::{GateConfig, StepConfig};
use engine_core::context::env::Environment;
use model::execution::{errors::ConfigurationError, spec::BatchSpec};
use std::sync::Arc;

pub mod archive;
pub mod copy_columns;
pub mod dedupe;
pub mod gated;
pub mod sharding_key;
pub mod sql;

pub use archive::ArchiveRows;
pub use copy_columns::CopyColumns;
pub use dedupe::DeduplicateReferences;
pub use gated::Gated;
pub use sharding_key::ShardingKeyBackfill;
pub use sql::SqlTemplate;

/// Builds the SQL step described by `config`, wrapped in a gate when one is set.
pub fn build_step(
    config: &StepConfig,
    spec: &BatchSpec,
    gate: Option<GateConfig>,
    env: Arc<dyn Environment>,
) -> Result<Arc<dyn MutationStep>, ConfigurationError> {
    let step: Arc<dyn MutationStep> = match config {
        StepConfig::CopyColumns(copy) if copy.sources.is_empty() && copy.destinations.is_empty() => {
            Arc::new(CopyColumns::from_arguments(spec.arguments())?)
        }
        StepConfig::CopyColumns(copy) => Arc::new(CopyColumns::new(
            copy.sources.clone(),
            copy.destinations.clone(),
        )?),
        StepConfig::ArchiveRows(archive) => Arc::new(ArchiveRows::new(archive)?),
        StepConfig::ShardingKey(sharding) => Arc::new(ShardingKeyBackfill::new(sharding)?),
        StepConfig::DeduplicateReferences(dedupe) => {
            Arc::new(DeduplicateReferences::new(dedupe)?)
        }
        StepConfig::Sql(sql) => Arc::new(SqlTemplate::new(sql)?),
    };

    Ok(match gate {
        Some(gate) => Arc::new(Gated::new(step, gate, env)),
        None => step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_config::settings::CopyColumnsConfig;
    use engine_core::context::env::StaticEnvironment;
    use model::{
        core::identifiers::TableRef, execution::arguments::JobArguments,
        pagination::cursor::KeyColumns,
    };
    use serde_json::json;

    fn spec(arguments: Vec<serde_json::Value>) -> BatchSpec {
        BatchSpec::builder(TableRef::new("ci_builds"), KeyColumns::single("id"))
            .arguments(JobArguments::from_json(arguments))
            .build()
            .unwrap()
    }

    #[test]
    fn copy_columns_falls_back_to_job_arguments() {
        let spec = spec(vec![json!(["old_col"]), json!(["new_col"])]);
        let step = build_step(
            &StepConfig::CopyColumns(CopyColumnsConfig::default()),
            &spec,
            None,
            Arc::new(StaticEnvironment::new()),
        )
        .unwrap();
        assert_eq!(step.operation_name(), "update_all");
    }

    #[test]
    fn mismatched_argument_pairs_fail_fast() {
        let spec = spec(vec![json!(["a", "b"]), json!(["c"])]);
        let result = build_step(
            &StepConfig::CopyColumns(CopyColumnsConfig::default()),
            &spec,
            None,
            Arc::new(StaticEnvironment::new()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::MismatchedColumnPairs {
                sources: 2,
                destinations: 1
            })
        ));
    }
}
