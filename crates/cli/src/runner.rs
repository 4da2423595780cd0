use crate::{env::load_env, error::CliError};
use chrono::Utc;
use connectors::sql::{
    base::{adapter::SqlAdapter, probe::KeyProbe},
    postgres::{adapter::PgAdapter, utils::redact_url},
};
use engine_config::{
    report::{plan::PlanReport, summary::JobSummary},
    settings::{JobConfig, validated::ValidatedJob, validator::JobValidator},
};
use engine_core::{
    context::env::{EnvContext, Environment, ProcessEnvironment},
    metrics::BatchMetrics,
    retry::RetryError,
    state::{CheckpointStage, StateStore},
};
use engine_processing::{
    BatchedMigrationJob, JobState, cursor::SubBatchIterator, retry::perform_with_retry,
    steps::build_step,
};
use model::pagination::{cursor::Key, range::BatchRange};
use std::{sync::Arc, time::Instant};
use tracing::{error, info, warn};

/// A validated job with an open connection to its database.
pub struct JobContext {
    pub job: ValidatedJob,
    pub env: EnvContext,
    pub adapter: PgAdapter,
}

impl JobContext {
    /// Loads and validates the job file, then connects and checks the table.
    pub async fn prepare(config_path: &str, env_file: Option<&str>) -> Result<Self, CliError> {
        let env = load_env(env_file)?;
        let config = JobConfig::from_file(config_path)?;
        let job = JobValidator::new().validate(&config)?;

        let url = config.connection_url(&env)?;
        info!(job = %job.job_id, url = %redact_url(&url), "Connecting");
        let adapter = PgAdapter::connect(&url).await?;
        job.check_schema(&adapter).await?;

        Ok(JobContext { job, env, adapter })
    }

    pub async fn bounds(&self) -> Result<Option<BatchRange>, CliError> {
        let spec = &self.job.spec;
        Ok(self.adapter.key_bounds(spec.table(), spec.key_columns()).await?)
    }

    /// The windows a run would process, up to `limit`.
    pub async fn plan(&self, limit: usize) -> Result<PlanReport, CliError> {
        let spec = &self.job.spec;
        let mut report = PlanReport {
            job_id: self.job.job_id.to_string(),
            table: spec.table().to_string(),
            sub_batch_size: spec.sub_batch_size(),
            pause_ms: spec.pause().as_millis() as u64,
            ..Default::default()
        };

        let Some(range) = self.job.resolve_range(&self.adapter).await? else {
            return Ok(report);
        };
        let (windows, truncated) = SubBatchIterator::new(&self.adapter, spec, range.clone())?
            .collect_windows(Some(limit))
            .await?;

        report.range = Some(range);
        report.windows = windows;
        report.truncated = truncated;
        Ok(report)
    }

    /// Performs the job under its retry policy, checkpointing into `state`.
    ///
    /// A failed run still yields a summary; its `error` is set.
    pub async fn run(
        self,
        state: Arc<dyn StateStore>,
        resume: bool,
    ) -> Result<JobSummary, CliError> {
        let JobContext { job, env, adapter } = self;
        let metrics = BatchMetrics::new();

        let Some(range) = job.resolve_range(&adapter).await? else {
            return Ok(empty_summary(&job, &metrics));
        };

        let resume_after = if resume {
            resume_point(state.as_ref(), &job, &range).await?
        } else {
            None
        };

        let environment: Arc<dyn Environment> = Arc::new(ProcessEnvironment::from_context(&env));
        let step = build_step(&job.step, &job.spec, job.gate.clone(), environment)?;
        let store: Arc<dyn SqlAdapter> = Arc::new(adapter);

        let started = Instant::now();
        let mut attempts = 0;
        let result = perform_with_retry(&job.retry, resume_after, |resume| {
            attempts += 1;
            Ok(BatchedMigrationJob::<dyn SqlAdapter>::new(
                Arc::clone(&store),
                range.clone(),
                job.spec.clone(),
                Arc::clone(&step),
            )?
            .with_checkpoints(Arc::clone(&state), job.job_id.clone())
            .with_metrics(metrics.clone())
            .resume_after(resume))
        })
        .await;

        match result {
            Ok(report) => Ok(report.to_summary(&metrics)),
            Err(err) => {
                let err = match err {
                    RetryError::Fatal(err) => err,
                    RetryError::AttemptsExceeded { attempts: tried, last } => {
                        error!(job = %job.job_id, attempts = tried, "Retry attempts exhausted");
                        last
                    }
                };
                let checkpoint = state.load_checkpoint(job.job_id.as_str()).await?;
                Ok(JobSummary {
                    job_id: job.job_id.to_string(),
                    table: job.spec.table().to_string(),
                    operation: step.operation_name().to_string(),
                    state: JobState::Failed.to_string(),
                    range: Some(range),
                    sub_batches: checkpoint
                        .as_ref()
                        .map_or(0, |cp| cp.sub_batches_done as usize),
                    rows_affected: checkpoint.as_ref().map_or(0, |cp| cp.rows_affected),
                    last_completed: checkpoint.as_ref().and_then(|cp| cp.last_completed_key()),
                    elapsed_ms: started.elapsed().as_millis(),
                    attempts,
                    metrics: metrics.snapshot(),
                    timings: metrics.timings(),
                    error: Some(err.to_string()),
                    finished_at: Utc::now(),
                })
            }
        }
    }
}

/// Where a `--resume` run starts: after the checkpointed key of an unfinished
/// run over the same range, otherwise from the beginning.
async fn resume_point(
    state: &dyn StateStore,
    job: &ValidatedJob,
    range: &BatchRange,
) -> Result<Option<Key>, CliError> {
    let Some(checkpoint) = state.load_checkpoint(job.job_id.as_str()).await? else {
        info!(job = %job.job_id, "No checkpoint found, starting from the beginning");
        return Ok(None);
    };

    if &checkpoint.range() != range {
        warn!(
            job = %job.job_id,
            saved = %checkpoint.range(),
            requested = %range,
            "Checkpoint covers a different range, starting from the beginning"
        );
        return Ok(None);
    }
    if checkpoint.stage == CheckpointStage::Completed {
        info!(job = %job.job_id, "Previous run completed, running the range again");
        return Ok(None);
    }

    let key = checkpoint.last_completed_key();
    info!(job = %job.job_id, resume_after = ?key, "Resuming from checkpoint");
    Ok(key)
}

fn empty_summary(job: &ValidatedJob, metrics: &BatchMetrics) -> JobSummary {
    JobSummary {
        job_id: job.job_id.to_string(),
        table: job.spec.table().to_string(),
        operation: job.step.kind().to_string(),
        state: JobState::Completed.to_string(),
        range: None,
        sub_batches: 0,
        rows_affected: 0,
        last_completed: None,
        elapsed_ms: 0,
        attempts: 0,
        metrics: metrics.snapshot(),
        timings: Vec::new(),
        error: None,
        finished_at: Utc::now(),
    }
}
