use crate::{
    cursor::iterator::SubBatchIterator,
    error::JobError,
    job::checkpoint::CheckpointWriter,
    pacing::{Pacer, PacingController},
    step::{BatchScope, MutationStep},
};
use connectors::sql::base::{adapter::SqlAdapter, probe::KeyProbe};
use engine_core::{metrics::BatchMetrics, state::StateStore};
use model::{
    core::identifiers::JobId,
    execution::spec::BatchSpec,
    pagination::{cursor::Key, range::BatchRange},
};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error, info};

mod checkpoint;
pub mod report;

pub use report::{JobReport, JobState};

#[derive(Debug, Default)]
struct RunProgress {
    sub_batches: usize,
    rows_affected: u64,
    last_completed: Option<Key>,
}

/// Drives one mutation step across a key range, one sub-batch at a time.
///
/// Each window is applied and committed on its own, so a failure leaves the
/// earlier windows in place and the job can be re-run or resumed after the
/// last completed key. The job runs once: build a new one to run again.
pub struct BatchedMigrationJob<S: ?Sized + KeyProbe + Sync + 'static = dyn SqlAdapter> {
    job_id: JobId,
    store: Arc<S>,
    spec: BatchSpec,
    range: BatchRange,
    step: Arc<dyn MutationStep<S>>,
    pacing: PacingController,
    metrics: BatchMetrics,
    checkpoints: Option<Arc<dyn StateStore>>,
    resume_after: Option<Key>,
    last_completed: Option<Key>,
    state: JobState,
}

impl<S: ?Sized + KeyProbe + Sync + 'static> BatchedMigrationJob<S> {
    /// Validates the range against the key columns and lets the step check
    /// its own configuration; nothing touches the store yet.
    pub fn new(
        store: Arc<S>,
        range: BatchRange,
        spec: BatchSpec,
        step: Arc<dyn MutationStep<S>>,
    ) -> Result<Self, JobError> {
        range.check_arity(spec.key_columns().len())?;
        step.validate(&spec)?;

        Ok(BatchedMigrationJob {
            job_id: JobId::new(spec.table().to_string()),
            pacing: PacingController::new(spec.pause()),
            store,
            spec,
            range,
            step,
            metrics: BatchMetrics::new(),
            checkpoints: None,
            resume_after: None,
            last_completed: None,
            state: JobState::Ready,
        })
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacing = self.pacing.with_pacer(pacer);
        self
    }

    /// Shares a metrics handle, e.g. one collecting several attempts.
    pub fn with_metrics(mut self, metrics: BatchMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Saves the last completed key under `job_id` after every window.
    pub fn with_checkpoints(mut self, store: Arc<dyn StateStore>, job_id: JobId) -> Self {
        self.checkpoints = Some(store);
        self.job_id = job_id;
        self
    }

    /// Skips every key up to and including `key`.
    pub fn resume_after(mut self, key: Option<Key>) -> Self {
        self.resume_after = key;
        self
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn spec(&self) -> &BatchSpec {
        &self.spec
    }

    pub fn range(&self) -> &BatchRange {
        &self.range
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// A handle onto the timing samples; it stays live while `perform` runs.
    pub fn batch_metrics(&self) -> BatchMetrics {
        self.metrics.clone()
    }

    /// End of the last committed window, kept after a failure too.
    pub fn last_completed(&self) -> Option<&Key> {
        self.last_completed.as_ref()
    }

    pub fn operation_name(&self) -> &str {
        self.step.operation_name()
    }

    pub async fn perform(&mut self) -> Result<JobReport, JobError> {
        if self.state != JobState::Ready {
            return Err(JobError::AlreadyPerformed);
        }
        self.state = JobState::Running;

        let started = Instant::now();
        info!(
            job = %self.job_id,
            table = %self.spec.table(),
            range = %self.range,
            resume_after = ?self.resume_after,
            sub_batch_size = self.spec.sub_batch_size(),
            pause_ms = self.pacing.pause().as_millis() as u64,
            operation = self.step.operation_name(),
            "Starting batched job"
        );

        let mut progress = RunProgress {
            last_completed: self.resume_after.clone(),
            ..Default::default()
        };
        let outcome = self.run(&mut progress).await;
        self.last_completed = progress.last_completed.clone();

        match outcome {
            Ok(()) => {
                self.state = JobState::Completed;
                let report = self.report(progress, started);
                info!(
                    job = %self.job_id,
                    sub_batches = report.sub_batches,
                    rows_affected = report.rows_affected,
                    duration_ms = report.elapsed.as_millis(),
                    "Batched job completed"
                );
                Ok(report)
            }
            Err(err) => {
                self.state = JobState::Failed;
                error!(
                    job = %self.job_id,
                    sub_batches = progress.sub_batches,
                    last_completed = ?progress.last_completed,
                    error = %err,
                    "Batched job failed"
                );
                Err(err)
            }
        }
    }

    async fn run(&self, progress: &mut RunProgress) -> Result<(), JobError> {
        let mut checkpoint = match &self.checkpoints {
            Some(store) => Some(
                CheckpointWriter::start(
                    Arc::clone(store),
                    &self.job_id,
                    &self.spec.table().to_string(),
                    &self.range,
                    self.resume_after.as_ref(),
                )
                .await?,
            ),
            None => None,
        };

        let result = self.run_windows(progress, checkpoint.as_mut()).await;

        if let Some(checkpoint) = checkpoint.as_mut() {
            match &result {
                Ok(()) => checkpoint.complete().await?,
                Err(err) => checkpoint.fail(err).await,
            }
        }
        result
    }

    async fn run_windows(
        &self,
        progress: &mut RunProgress,
        mut checkpoint: Option<&mut CheckpointWriter>,
    ) -> Result<(), JobError> {
        let mut windows = SubBatchIterator::new(self.store.as_ref(), &self.spec, self.range.clone())?;
        if let Some(key) = &self.resume_after {
            windows = windows.resume_after(key)?;
        }

        let operation = self.step.operation_name();
        let mut first = true;

        loop {
            let window = match windows.next_window().await {
                Ok(Some(window)) => window,
                Ok(None) => return Ok(()),
                Err(source) => {
                    return Err(JobError::Cursor {
                        after: progress.last_completed.clone(),
                        source,
                    });
                }
            };

            if !first {
                self.pacing.between_sub_batches().await;
            }
            first = false;

            debug!(job = %self.job_id, window = %window, "Applying sub-batch");
            let scope = BatchScope::new(&self.spec, &window);
            let started = Instant::now();

            let rows = match self.step.apply(self.store.as_ref(), &scope).await {
                Ok(rows) => rows,
                Err(source) => {
                    self.metrics.record_failure();
                    error!(
                        job = %self.job_id,
                        sub_batch = window.index,
                        start = %window.start,
                        end = %window.end,
                        error = %source,
                        "Sub-batch failed"
                    );
                    return Err(JobError::Mutation { window, source });
                }
            };

            let elapsed = started.elapsed();
            self.metrics
                .record_timing(operation, window.index, elapsed, rows);
            progress.sub_batches += 1;
            progress.rows_affected += rows;
            progress.last_completed = Some(window.end.clone());

            if let Some(checkpoint) = checkpoint.as_deref_mut() {
                checkpoint.advance(&window.end, rows).await?;
            }

            debug!(
                job = %self.job_id,
                sub_batch = window.index,
                rows,
                duration_ms = elapsed.as_millis() as u64,
                "Sub-batch committed"
            );
        }
    }

    fn report(&self, progress: RunProgress, started: Instant) -> JobReport {
        JobReport {
            job_id: self.job_id.clone(),
            table: self.spec.table().to_string(),
            operation: self.step.operation_name().to_string(),
            state: self.state,
            range: self.range.clone(),
            sub_batches: progress.sub_batches,
            rows_affected: progress.rows_affected,
            last_completed: progress.last_completed,
            elapsed: started.elapsed(),
            attempts: 1,
        }
    }
}
