use crate::{
    error::{JobError, MutationError},
    job::{BatchedMigrationJob, JobReport},
};
use connectors::sql::base::{
    error::{ConnectorError, DbError},
    probe::KeyProbe,
};
use engine_core::retry::{RetryDisposition, RetryError, RetryPolicy};
use model::pagination::cursor::Key;
use std::sync::Mutex;
use tokio_postgres::{Error as PgError, error::SqlState};
use tracing::info;

/// Re-runs a job after transient store failures.
///
/// Every attempt gets a fresh job from `make_job`, resuming after the last
/// window the previous attempt committed. Non-transient errors stop at once.
pub async fn perform_with_retry<S, F>(
    policy: &RetryPolicy,
    resume_after: Option<Key>,
    mut make_job: F,
) -> Result<JobReport, RetryError<JobError>>
where
    S: ?Sized + KeyProbe + Sync + 'static,
    F: FnMut(Option<Key>) -> Result<BatchedMigrationJob<S>, JobError>,
{
    let resume = Mutex::new(resume_after);
    let resume = &resume;

    policy
        .run(
            |attempt| {
                let start_after = resume
                    .lock()
                    .map(|key| key.clone())
                    .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
                if attempt > 0 {
                    info!(attempt = attempt + 1, resume_after = ?start_after, "Retrying batched job");
                }
                let built = make_job(start_after);

                async move {
                    let mut job = built?;
                    match job.perform().await {
                        Ok(mut report) => {
                            report.attempts = attempt + 1;
                            Ok(report)
                        }
                        Err(err) => {
                            if let Some(last) = job.last_completed() {
                                let mut slot = resume.lock().unwrap_or_else(|p| p.into_inner());
                                *slot = Some(last.clone());
                            }
                            Err(err)
                        }
                    }
                }
            },
            classify_job_error,
        )
        .await
}

pub fn classify_job_error(err: &JobError) -> RetryDisposition {
    match err {
        JobError::Mutation {
            source: MutationError::Db(db_err),
            ..
        } => classify_db_error(db_err),
        JobError::Cursor { source, .. } => classify_db_error(source),
        JobError::Mutation { .. } => RetryDisposition::Stop,
        JobError::InvalidConfiguration(_) => RetryDisposition::Stop,
        JobError::AlreadyPerformed => RetryDisposition::Stop,
        JobError::Checkpoint(_) => RetryDisposition::Stop,
    }
}

pub fn classify_db_error(err: &DbError) -> RetryDisposition {
    match err {
        DbError::Io(_) => RetryDisposition::Retry,
        DbError::PgError(pg_err) => classify_pg_error(pg_err),
        DbError::Write(_) => RetryDisposition::Stop,
        DbError::QueryBuildError(_) => RetryDisposition::Stop,
        DbError::UnsupportedKey { .. } => RetryDisposition::Stop,
        DbError::Unknown(_) => RetryDisposition::Stop,
    }
}

pub fn classify_connector_error(err: &ConnectorError) -> RetryDisposition {
    match err {
        ConnectorError::Connection(pg_err) => classify_pg_error(pg_err),
        ConnectorError::InvalidUrl(_) => RetryDisposition::Stop,
        ConnectorError::TlsConfig(_) => RetryDisposition::Retry,
    }
}

pub fn classify_pg_error(err: &PgError) -> RetryDisposition {
    if err.is_closed() {
        return RetryDisposition::Retry;
    }

    if let Some(code) = err.code()
        && is_retryable_pg_code(code)
    {
        return RetryDisposition::Retry;
    }

    RetryDisposition::Stop
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
            | SqlState::OPERATOR_INTERVENTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        step::{BatchScope, MutationStep},
        test_support::KeySpace,
    };
    use async_trait::async_trait;
    use model::{
        core::identifiers::TableRef,
        execution::{errors::ConfigurationError, spec::BatchSpec},
        pagination::{cursor::KeyColumns, range::BatchRange},
    };
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    /// Fails window `fail_index` with `error` the first `failures` times it is reached.
    struct Flaky {
        fail_index: usize,
        failures: AtomicUsize,
        transient: bool,
        applied: Mutex<Vec<Key>>,
    }

    impl Flaky {
        fn new(fail_index: usize, failures: usize, transient: bool) -> Self {
            Flaky {
                fail_index,
                failures: AtomicUsize::new(failures),
                transient,
                applied: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MutationStep<KeySpace> for Flaky {
        async fn apply(
            &self,
            _store: &KeySpace,
            scope: &BatchScope<'_>,
        ) -> Result<u64, MutationError> {
            let window = scope.window();
            let first_pending = self.applied.lock().unwrap().len() == self.fail_index;
            if first_pending
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(if self.transient {
                    MutationError::Db(DbError::Io(io::Error::other("connection reset")))
                } else {
                    MutationError::Db(DbError::Write("duplicate key".into()))
                });
            }
            self.applied.lock().unwrap().push(window.start.clone());
            Ok(1)
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn make_job(
        step: &Arc<Flaky>,
    ) -> impl FnMut(Option<Key>) -> Result<BatchedMigrationJob<KeySpace>, JobError> + '_ {
        move |resume| {
            let spec = BatchSpec::builder(TableRef::new("events"), KeyColumns::single("id"))
                .sub_batch_size(3)
                .build()?;
            let step: Arc<dyn MutationStep<KeySpace>> = step.clone();
            Ok(BatchedMigrationJob::new(
                Arc::new(KeySpace::scalars(1..=9)),
                BatchRange::new(1, 9),
                spec,
                step,
            )?
            .resume_after(resume))
        }
    }

    #[tokio::test]
    async fn transient_failures_resume_after_the_last_window() {
        let step = Arc::new(Flaky::new(1, 2, true));
        let report = perform_with_retry(&policy(), None, make_job(&step))
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.last_completed, Some(Key::Scalar(9)));
        // Window [1, 3] committed once, before the failures.
        assert_eq!(
            *step.applied.lock().unwrap(),
            vec![Key::Scalar(1), Key::Scalar(4), Key::Scalar(7)]
        );
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let step = Arc::new(Flaky::new(0, 1, false));
        let err = perform_with_retry(&policy(), None, make_job(&step))
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Fatal(JobError::Mutation { .. })));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let step = Arc::new(Flaky::new(0, 10, true));
        let err = perform_with_retry(&policy(), None, make_job(&step))
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::AttemptsExceeded { attempts: 3, .. }));
    }

    #[test]
    fn configuration_errors_stop() {
        let err = JobError::InvalidConfiguration(ConfigurationError::EmptyKeyColumns);
        assert_eq!(classify_job_error(&err), RetryDisposition::Stop);
        assert_eq!(
            classify_db_error(&DbError::Io(io::Error::other("reset"))),
            RetryDisposition::Retry
        );
    }
}
