use async_trait::async_trait;
use connectors::sql::base::{error::DbError, probe::KeyProbe};
use model::{
    core::{identifiers::TableRef, value::Value},
    pagination::{
        cursor::{Key, KeyColumns},
        range::BatchRange,
    },
    records::batch::SubBatch,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};

pub type MemoryRow = BTreeMap<String, Value>;

/// Builds a row from `(column, value)` pairs.
pub fn row<const N: usize>(pairs: [(&str, Value); N]) -> MemoryRow {
    pairs
        .into_iter()
        .map(|(column, value)| (column.to_string(), value))
        .collect()
}

/// One keyed table. Rows are ordered by their key, like a primary key index.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    key_columns: Vec<String>,
    unique: Vec<Vec<String>>,
    rows: BTreeMap<Key, MemoryRow>,
}

impl MemoryTable {
    fn key_of(&self, row: &MemoryRow) -> Result<Key, DbError> {
        self.key_columns
            .iter()
            .map(|column| {
                row.get(column)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| DbError::UnsupportedKey {
                        column: column.clone(),
                        message: "missing or non-integer key value".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Key::from_components)
    }

    fn values_of<'a>(row: &'a MemoryRow, columns: &[String]) -> Option<Vec<&'a Value>> {
        columns
            .iter()
            .map(|c| row.get(c).filter(|v| !v.is_null()))
            .collect()
    }

    /// Row whose `columns` equal `values`, if any.
    pub fn find_by(&self, columns: &[&str], values: &[Value]) -> Option<(&Key, &MemoryRow)> {
        self.rows.iter().find(|(_, row)| {
            columns
                .iter()
                .zip(values)
                .all(|(column, value)| row.get(*column) == Some(value))
        })
    }

    /// Inserts a row, rejecting duplicate keys and unique violations.
    pub fn insert(&mut self, row: MemoryRow) -> Result<Key, DbError> {
        let key = self.key_of(&row)?;
        if self.rows.contains_key(&key) {
            return Err(DbError::Write(format!("duplicate key {key}")));
        }
        for index in &self.unique {
            if let Some(values) = Self::values_of(&row, index)
                && self
                    .rows
                    .values()
                    .any(|existing| Self::values_of(existing, index) == Some(values.clone()))
            {
                return Err(DbError::Write(format!(
                    "duplicate value for unique index ({})",
                    index.join(", ")
                )));
            }
        }
        self.rows.insert(key.clone(), row);
        Ok(key)
    }

    /// Largest scalar key plus one.
    pub fn next_id(&self) -> i64 {
        self.rows
            .keys()
            .next_back()
            .and_then(Key::as_scalar)
            .map_or(1, |id| id + 1)
    }

    pub fn get(&self, key: &Key) -> Option<&MemoryRow> {
        self.rows.get(key)
    }

    pub fn set(&mut self, key: &Key, column: &str, value: Value) -> Result<(), DbError> {
        let row = self
            .rows
            .get_mut(key)
            .ok_or_else(|| DbError::Write(format!("no row with key {key}")))?;
        row.insert(column.to_string(), value);
        Ok(())
    }

    pub fn delete(&mut self, key: &Key) -> Option<MemoryRow> {
        self.rows.remove(key)
    }

    /// Keys of the rows inside `window`, in order.
    pub fn keys_in(&self, window: &SubBatch) -> Vec<Key> {
        self.rows
            .range(window.start.clone()..=window.end.clone())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&Key, &MemoryRow)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Every table of a [`MemoryStore`], handed to transactions.
#[derive(Debug, Clone, Default)]
pub struct Tables(HashMap<String, MemoryTable>);

impl Tables {
    pub fn table(&mut self, name: &str) -> Result<&mut MemoryTable, DbError> {
        self.0
            .get_mut(name)
            .ok_or_else(|| DbError::Write(format!("relation \"{name}\" does not exist")))
    }

    pub fn get(&self, name: &str) -> Option<&MemoryTable> {
        self.0.get(name)
    }
}

/// An in-process store of keyed tables with all-or-nothing transactions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_table(&self, name: &str, key_columns: &[&str]) {
        self.lock().0.insert(
            name.to_string(),
            MemoryTable {
                key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            },
        );
    }

    pub fn add_unique(&self, table: &str, columns: &[&str]) {
        if let Some(table) = self.lock().0.get_mut(table) {
            table.unique.push(columns.iter().map(|c| c.to_string()).collect());
        }
    }

    pub fn insert(&self, table: &str, row: MemoryRow) -> Result<Key, DbError> {
        self.lock().table(table)?.insert(row)
    }

    /// Copy of one table's rows in key order.
    pub fn rows(&self, table: &str) -> Vec<MemoryRow> {
        self.lock()
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, table: &str, key: impl Into<Key>) -> Option<MemoryRow> {
        let key = key.into();
        self.lock().get(table).and_then(|t| t.get(&key).cloned())
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock().get(table).map_or(0, MemoryTable::len)
    }

    /// Full copy of every table, for before/after comparisons.
    pub fn snapshot(&self) -> Tables {
        self.lock().clone()
    }

    /// Runs `f` on a working copy and publishes it only when `f` succeeds.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut guard = self.lock();
        let mut working = guard.clone();
        let value = f(&mut working)?;
        *guard = working;
        Ok(value)
    }
}

impl PartialEq for Tables {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(name, table)| other.0.get(name).is_some_and(|o| o.rows == table.rows))
    }
}

#[async_trait]
impl KeyProbe for MemoryStore {
    async fn key_bounds(
        &self,
        table: &TableRef,
        _columns: &KeyColumns,
    ) -> Result<Option<BatchRange>, DbError> {
        let mut tables = self.lock();
        let table = tables.table(&table.path())?;
        Ok(table
            .rows
            .keys()
            .next()
            .zip(table.rows.keys().next_back())
            .map(|(first, last)| BatchRange::new(first.clone(), last.clone())))
    }

    async fn next_window(
        &self,
        table: &TableRef,
        _columns: &KeyColumns,
        range: &BatchRange,
        after: Option<&Key>,
        limit: usize,
    ) -> Result<Option<(Key, Key)>, DbError> {
        if range.is_empty() {
            return Ok(None);
        }
        let mut tables = self.lock();
        let table = tables.table(&table.path())?;

        let mut keys = table
            .rows
            .range(range.start.clone()..=range.end.clone())
            .map(|(key, _)| key)
            .filter(|key| after.is_none_or(|after| *key > after))
            .take(limit);

        let Some(first) = keys.next() else {
            return Ok(None);
        };
        let last = keys.last().unwrap_or(first);
        Ok(Some((first.clone(), last.clone())))
    }
}
