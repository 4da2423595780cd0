use crate::error::MutationError;
use async_trait::async_trait;
use connectors::sql::base::{
    adapter::SqlAdapter,
    error::DbError,
    query::generator::{ParamList, QueryGenerator},
};
use model::{
    core::identifiers::TableRef,
    execution::{arguments::JobArguments, errors::ConfigurationError, spec::BatchSpec},
    pagination::cursor::KeyColumns,
    records::batch::SubBatch,
};

/// Everything a step may look at while applying one window.
#[derive(Debug, Clone, Copy)]
pub struct BatchScope<'a> {
    spec: &'a BatchSpec,
    window: &'a SubBatch,
}

impl<'a> BatchScope<'a> {
    pub fn new(spec: &'a BatchSpec, window: &'a SubBatch) -> Self {
        BatchScope { spec, window }
    }

    pub fn spec(&self) -> &'a BatchSpec {
        self.spec
    }

    pub fn window(&self) -> &'a SubBatch {
        self.window
    }

    pub fn table(&self) -> &'a TableRef {
        self.spec.table()
    }

    pub fn key_columns(&self) -> &'a KeyColumns {
        self.spec.key_columns()
    }

    pub fn arguments(&self) -> &'a JobArguments {
        self.spec.arguments()
    }

    /// SQL predicate restricting a statement to this window, binding its bounds into `params`.
    pub fn predicate(&self, alias: Option<&str>, params: &mut ParamList) -> Result<String, DbError> {
        QueryGenerator::window_predicate(
            self.key_columns(),
            alias,
            &self.window.start,
            &self.window.end,
            params,
        )
    }
}

/// The write a job applies to every sub-batch.
///
/// Implementations must touch only rows inside the scope's window and must be
/// idempotent: applying a window twice leaves the store as applying it once.
/// Store errors are returned unchanged; retrying is the caller's business.
#[async_trait]
pub trait MutationStep<S: ?Sized + Sync = dyn SqlAdapter>: Send + Sync {
    /// Label attached to timing samples.
    fn operation_name(&self) -> &str {
        "update_all"
    }

    /// Checked once when the job is built, before any window runs.
    fn validate(&self, _spec: &BatchSpec) -> Result<(), ConfigurationError> {
        Ok(())
    }

    /// Returns the number of rows affected.
    async fn apply(&self, store: &S, scope: &BatchScope<'_>) -> Result<u64, MutationError>;
}
