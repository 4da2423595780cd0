use async_trait::async_trait;
use connectors::sql::base::{
    adapter::{DatabaseKind, SqlAdapter},
    error::DbError,
    probe::KeyProbe,
    statement::Statement,
};
use model::{
    core::{identifiers::TableRef, value::Value},
    pagination::{
        cursor::{Key, KeyColumns},
        range::BatchRange,
    },
    records::row::RowData,
};
use std::{
    collections::BTreeSet,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// A sorted set of keys answering cursor probes.
pub struct KeySpace {
    keys: BTreeSet<Key>,
    probes: AtomicUsize,
}

impl KeySpace {
    pub fn scalars(ids: impl IntoIterator<Item = i64>) -> Self {
        Self::from_keys(ids.into_iter().map(Key::Scalar))
    }

    pub fn tuples<const N: usize>(ids: impl IntoIterator<Item = [i64; N]>) -> Self {
        Self::from_keys(ids.into_iter().map(|parts| Key::from_components(parts.to_vec())))
    }

    fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        KeySpace {
            keys: keys.into_iter().collect(),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probe_calls(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyProbe for KeySpace {
    async fn key_bounds(
        &self,
        _table: &TableRef,
        _columns: &KeyColumns,
    ) -> Result<Option<BatchRange>, DbError> {
        Ok(self
            .keys
            .first()
            .zip(self.keys.last())
            .map(|(start, end)| BatchRange::new(start.clone(), end.clone())))
    }

    async fn next_window(
        &self,
        _table: &TableRef,
        _columns: &KeyColumns,
        range: &BatchRange,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Option<(Key, Key)>, DbError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut window = self
            .keys
            .iter()
            .filter(|key| match after {
                Some(after) => *key > after,
                None => *key >= &range.start,
            })
            .take_while(|key| *key <= &range.end)
            .take(limit);

        let Some(first) = window.next() else {
            return Ok(None);
        };
        let last = window.last().unwrap_or(first);
        Ok(Some((first.clone(), last.clone())))
    }
}

/// Captures statements instead of running them.
#[derive(Default)]
pub struct RecordingAdapter {
    pub columns: Vec<String>,
    pub affected: u64,
    pub executed: Mutex<Vec<Statement>>,
    pub transactions: AtomicUsize,
}

impl RecordingAdapter {
    pub fn with_columns(columns: &[&str]) -> Self {
        RecordingAdapter {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            affected: 1,
            ..Default::default()
        }
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyProbe for RecordingAdapter {
    async fn key_bounds(
        &self,
        _table: &TableRef,
        _columns: &KeyColumns,
    ) -> Result<Option<BatchRange>, DbError> {
        Ok(None)
    }

    async fn next_window(
        &self,
        _table: &TableRef,
        _columns: &KeyColumns,
        _range: &BatchRange,
        _after: Option<&Key>,
        _limit: usize,
    ) -> Result<Option<(Key, Key)>, DbError> {
        Ok(None)
    }
}

#[async_trait]
impl SqlAdapter for RecordingAdapter {
    async fn exec(&self, query: &str) -> Result<(), DbError> {
        self.executed.lock().unwrap().push(Statement::raw(query));
        Ok(())
    }

    async fn exec_params(&self, query: &str, params: Vec<Value>) -> Result<u64, DbError> {
        self.executed
            .lock()
            .unwrap()
            .push(Statement::new(query, params));
        Ok(self.affected)
    }

    async fn exec_atomic(&self, statements: Vec<Statement>) -> Result<u64, DbError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        let count = statements.len() as u64;
        self.executed.lock().unwrap().extend(statements);
        Ok(self.affected * count)
    }

    async fn query_rows(&self, _sql: &str, _params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        Ok(Vec::new())
    }

    async fn table_exists(&self, _table: &TableRef) -> Result<bool, DbError> {
        Ok(true)
    }

    async fn table_columns(&self, _table: &TableRef) -> Result<Vec<String>, DbError> {
        Ok(self.columns.clone())
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Other("recording".to_string())
    }
}
