use crate::sql::base::error::DbError;
use async_trait::async_trait;
use model::{
    core::identifiers::TableRef,
    pagination::{
        cursor::{Key, KeyColumns},
        range::BatchRange,
    },
};

/// Key-space lookups the sub-batch iterator needs from a store.
#[async_trait]
pub trait KeyProbe: Send + Sync {
    /// Smallest and largest key currently in the table, `None` when it is empty.
    async fn key_bounds(
        &self,
        table: &TableRef,
        columns: &KeyColumns,
    ) -> Result<Option<BatchRange>, DbError>;

    /// First and last of the next `limit` keys inside `range`, ordered ascending.
    ///
    /// With `after = Some(k)` only keys strictly greater than `k` are considered,
    /// otherwise scanning begins at `range.start` (inclusive).
    async fn next_window(
        &self,
        table: &TableRef,
        columns: &KeyColumns,
        range: &BatchRange,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Option<(Key, Key)>, DbError>;
}
