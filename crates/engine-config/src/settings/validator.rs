use crate::settings::{
    JobConfig, StepConfig, error::JobConfigError, validated::ValidatedJob,
};
use engine_core::retry::RetryPolicy;
use model::{
    core::identifiers::{JobId, TableRef},
    execution::{arguments::JobArguments, spec::BatchSpec},
    pagination::cursor::Key,
};
use tracing::{info, warn};

const LARGE_SUB_BATCH: i64 = 100_000;

/// Checks a job document before anything connects to the database.
#[derive(Debug, Default)]
pub struct JobValidator;

impl JobValidator {
    pub fn new() -> Self {
        JobValidator
    }

    pub fn validate(&self, config: &JobConfig) -> Result<ValidatedJob, JobConfigError> {
        info!(job = %config.name, table = %config.table, step = config.step.kind(), "Validating job");

        let mut errors: Vec<String> = Vec::new();

        if config.name.trim().is_empty() {
            errors.push("name must not be empty".to_string());
        }

        let table = match config.table.parse::<TableRef>() {
            Ok(table) => Some(table),
            Err(err) => {
                errors.push(err.to_string());
                None
            }
        };

        self.validate_bounds(config, &mut errors);
        self.validate_pacing(config);
        self.validate_step(config, &mut errors);

        if let Some(gate) = &config.only_if
            && gate.is_empty()
        {
            errors.push("only_if needs at least one of 'saas' or 'feature'".to_string());
        }

        let spec = table.and_then(|table| {
            BatchSpec::builder(table, config.batch_column.clone())
                .sub_batch_size(config.sub_batch_size)
                .pause_ms(config.pause_ms)
                .strategy(config.strategy)
                .arguments(JobArguments::from_json(config.job_arguments.clone()))
                .build()
                .map_err(|err| errors.push(err.to_string()))
                .ok()
        });

        let Some(spec) = spec.filter(|_| errors.is_empty()) else {
            return Err(JobConfigError::ValidationFailed(errors));
        };

        let validated = ValidatedJob {
            job_id: JobId::new(config.name.clone()),
            spec,
            start: config.start.clone(),
            end: config.end.clone(),
            step: config.step.clone(),
            gate: config.only_if.clone(),
            retry: config.retry.clone().unwrap_or_else(RetryPolicy::none),
        };

        self.log_validated(&validated);
        Ok(validated)
    }

    fn validate_bounds(&self, config: &JobConfig, errors: &mut Vec<String>) {
        let arity = config.batch_column.len();
        for (label, key) in [("start", &config.start), ("end", &config.end)] {
            if let Some(key) = key
                && key.arity() != arity
            {
                errors.push(format!(
                    "{label} {key} has {} component(s) but batch_column has {arity}",
                    key.arity()
                ));
            }
        }

        if let (Some(start), Some(end)) = (&config.start, &config.end)
            && start > end
        {
            warn!(%start, %end, "start is after end, the job will process nothing");
        }
    }

    fn validate_pacing(&self, config: &JobConfig) {
        if config.sub_batch_size > LARGE_SUB_BATCH {
            warn!(
                sub_batch_size = config.sub_batch_size,
                "Sub-batch size is very large, statements may hold locks for a long time"
            );
        }
        if config.pause_ms < 0 {
            warn!(pause_ms = config.pause_ms, "Negative pause clamped to 0");
        }
    }

    fn validate_step(&self, config: &JobConfig, errors: &mut Vec<String>) {
        match &config.step {
            StepConfig::CopyColumns(copy) => {
                if copy.sources.is_empty()
                    && copy.destinations.is_empty()
                    && config.job_arguments.len() < 2
                {
                    errors.push(
                        "copy_columns needs sources/destinations or two job_arguments".to_string(),
                    );
                }
            }
            StepConfig::ArchiveRows(archive) => {
                if archive.columns.is_empty() {
                    errors.push("archive_rows needs at least one column".to_string());
                }
                if archive.conflict_columns.is_empty() {
                    errors.push("archive_rows needs conflict_columns".to_string());
                }
                if let Err(err) = archive.archive_table.parse::<TableRef>() {
                    errors.push(err.to_string());
                }
            }
            StepConfig::ShardingKey(sharding) => {
                if sharding.targets.is_empty() {
                    errors.push("sharding_key needs at least one target".to_string());
                }
                if let Some(fallback) = &sharding.fallback
                    && !sharding.targets.iter().any(|t| t.column == fallback.column)
                {
                    errors.push(format!(
                        "sharding_key fallback column '{}' is not one of the targets",
                        fallback.column
                    ));
                }
            }
            StepConfig::DeduplicateReferences(dedupe) => {
                if let Err(err) = dedupe.reference_table.parse::<TableRef>() {
                    errors.push(err.to_string());
                }
            }
            StepConfig::Sql(sql) => {
                if sql.statements.iter().all(|s| s.trim().is_empty()) {
                    errors.push("sql step needs at least one statement".to_string());
                }
            }
        }
    }

    fn log_validated(&self, job: &ValidatedJob) {
        let bound = |key: &Option<Key>| {
            key.as_ref()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "<table bound>".to_string())
        };
        info!(
            job = %job.job_id,
            table = %job.spec.table(),
            batch_column = %job.spec.key_columns(),
            start = %bound(&job.start),
            end = %bound(&job.end),
            sub_batch_size = job.spec.sub_batch_size(),
            pause_ms = job.spec.pause().as_millis() as u64,
            strategy = ?job.spec.strategy(),
            retry_attempts = job.retry.max_attempts,
            "Job validated"
        );
    }
}
