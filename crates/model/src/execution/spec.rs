use crate::{
    core::identifiers::TableRef,
    execution::{arguments::JobArguments, errors::ConfigurationError},
    pagination::cursor::{CursorStrategy, KeyColumns},
};
use std::time::Duration;

/// Immutable description of what one job scans and how fast.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSpec {
    table: TableRef,
    key_columns: KeyColumns,
    sub_batch_size: usize,
    pause: Duration,
    strategy: CursorStrategy,
    arguments: JobArguments,
}

impl BatchSpec {
    pub fn builder(table: TableRef, key_columns: KeyColumns) -> BatchSpecBuilder {
        BatchSpecBuilder {
            table,
            key_columns,
            sub_batch_size: 100,
            pause_ms: 0,
            strategy: CursorStrategy::default(),
            arguments: JobArguments::default(),
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn key_columns(&self) -> &KeyColumns {
        &self.key_columns
    }

    pub fn sub_batch_size(&self) -> usize {
        self.sub_batch_size
    }

    /// Delay between sub-batches, already clamped at zero.
    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn strategy(&self) -> CursorStrategy {
        self.strategy
    }

    pub fn arguments(&self) -> &JobArguments {
        &self.arguments
    }
}

#[derive(Debug, Clone)]
pub struct BatchSpecBuilder {
    table: TableRef,
    key_columns: KeyColumns,
    sub_batch_size: i64,
    pause_ms: i64,
    strategy: CursorStrategy,
    arguments: JobArguments,
}

impl BatchSpecBuilder {
    pub fn sub_batch_size(mut self, size: i64) -> Self {
        self.sub_batch_size = size;
        self
    }

    /// Negative values are accepted and clamped to zero.
    pub fn pause_ms(mut self, pause_ms: i64) -> Self {
        self.pause_ms = pause_ms;
        self
    }

    pub fn strategy(mut self, strategy: CursorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn arguments(mut self, arguments: JobArguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn build(self) -> Result<BatchSpec, ConfigurationError> {
        if self.sub_batch_size <= 0 {
            return Err(ConfigurationError::NonPositiveSubBatchSize(
                self.sub_batch_size,
            ));
        }
        if self.key_columns.is_empty() {
            return Err(ConfigurationError::EmptyKeyColumns);
        }
        if self.strategy == CursorStrategy::Arithmetic && self.key_columns.is_composite() {
            return Err(ConfigurationError::ArithmeticCompositeKey);
        }

        Ok(BatchSpec {
            table: self.table,
            key_columns: self.key_columns,
            sub_batch_size: self.sub_batch_size as usize,
            pause: Duration::from_millis(self.pause_ms.max(0) as u64),
            strategy: self.strategy,
            arguments: self.arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> BatchSpecBuilder {
        BatchSpec::builder(TableRef::new("namespaces"), KeyColumns::single("id"))
    }

    #[test]
    fn clamps_negative_pause() {
        let spec = builder().pause_ms(-9).build().unwrap();
        assert_eq!(spec.pause(), Duration::ZERO);

        let spec = builder().pause_ms(100).build().unwrap();
        assert_eq!(spec.pause(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_non_positive_sub_batch_size() {
        assert_eq!(
            builder().sub_batch_size(0).build(),
            Err(ConfigurationError::NonPositiveSubBatchSize(0))
        );
        assert_eq!(
            builder().sub_batch_size(-5).build(),
            Err(ConfigurationError::NonPositiveSubBatchSize(-5))
        );
    }

    #[test]
    fn rejects_arithmetic_slicing_of_composite_keys() {
        let result = BatchSpec::builder(
            TableRef::new("p_ci_builds"),
            KeyColumns::composite(&["partition_id", "id"]),
        )
        .strategy(CursorStrategy::Arithmetic)
        .build();

        assert_eq!(result, Err(ConfigurationError::ArithmeticCompositeKey));
    }

    #[test]
    fn rejects_empty_composite_columns() {
        let result = BatchSpec::builder(TableRef::new("t"), KeyColumns::Composite(vec![])).build();
        assert_eq!(result, Err(ConfigurationError::EmptyKeyColumns));
    }
}
