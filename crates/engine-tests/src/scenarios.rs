//! Mutation steps over [`MemoryStore`] and the job scenarios they drive.

use crate::memory::{MemoryRow, MemoryStore, row};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors::sql::base::error::DbError;
use engine_processing::{BatchScope, MutationStep, error::MutationError};
use model::{
    core::value::Value,
    pagination::cursor::Key,
};
use std::{
    io,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// `UPDATE t SET to = from` for the rows of one window, skipping rows already equal.
pub struct CopyColumn {
    pub from: &'static str,
    pub to: &'static str,
}

#[async_trait]
impl MutationStep<MemoryStore> for CopyColumn {
    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let name = scope.table().path();
        let window = scope.window();

        let changed = store.transaction(|tables| {
            let table = tables.table(&name)?;
            let mut changed = 0;
            for key in table.keys_in(window) {
                let row = table.get(&key);
                let value = row
                    .and_then(|r| r.get(self.from))
                    .cloned()
                    .unwrap_or(Value::Null);
                if row.and_then(|r| r.get(self.to)) != Some(&value) {
                    table.set(&key, self.to, value)?;
                    changed += 1;
                }
            }
            Ok(changed)
        })?;
        Ok(changed)
    }
}

/// Writes the whole window, then fails before commit when it holds `poison`.
pub struct FailAfterWrite {
    pub copy: CopyColumn,
    pub poison: Key,
}

#[async_trait]
impl MutationStep<MemoryStore> for FailAfterWrite {
    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let name = scope.table().path();
        let window = scope.window();
        if !window.contains(&self.poison) {
            return self.copy.apply(store, scope).await;
        }

        store.transaction(|tables| {
            let table = tables.table(&name)?;
            for key in table.keys_in(window) {
                table.set(&key, self.copy.to, Value::from("partial"))?;
            }
            Err::<u64, _>(DbError::Write("check constraint violated".into()))
        })?;
        Ok(0)
    }
}

/// Fails the window holding `poison` with a connection error, `failures` times.
pub struct Flaky {
    pub copy: CopyColumn,
    pub poison: Key,
    pub failures: AtomicUsize,
    pub windows: Mutex<Vec<Key>>,
}

#[async_trait]
impl MutationStep<MemoryStore> for Flaky {
    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let window = scope.window();
        if window.contains(&self.poison)
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(DbError::Io(io::Error::other("connection reset by peer")).into());
        }
        self.windows
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(window.start.clone());
        self.copy.apply(store, scope).await
    }
}

/// Records every key it is handed, touching nothing.
#[derive(Default)]
pub struct KeyRecorder {
    pub keys: Mutex<Vec<Key>>,
}

#[async_trait]
impl MutationStep<MemoryStore> for KeyRecorder {
    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let name = scope.table().path();
        let keys = store.transaction(|tables| Ok(tables.table(&name)?.keys_in(scope.window())))?;
        let count = keys.len() as u64;
        self.keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend(keys);
        Ok(count)
    }
}

/// Moves rows revoked before `cutoff` into `archive`, stamping `archived_at`.
pub struct ArchiveRevoked {
    pub archive: &'static str,
    pub cutoff: DateTime<Utc>,
}

#[async_trait]
impl MutationStep<MemoryStore> for ArchiveRevoked {
    fn operation_name(&self) -> &str {
        "archive_rows"
    }

    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let name = scope.table().path();
        let window = scope.window();
        let now = Utc::now();

        let moved = store.transaction(|tables| {
            let source = tables.table(&name)?;
            let mut moved: Vec<MemoryRow> = Vec::new();
            for key in source.keys_in(window) {
                let expired = matches!(
                    source.get(&key).and_then(|r| r.get("revoked_at")),
                    Some(Value::Timestamp(at)) if *at < self.cutoff
                );
                if expired && let Some(row) = source.delete(&key) {
                    moved.push(row);
                }
            }

            let archive = tables.table(self.archive)?;
            let mut inserted = 0;
            for mut row in moved {
                let exists = row
                    .get("id")
                    .and_then(Value::as_i64)
                    .is_some_and(|id| archive.get(&Key::Scalar(id)).is_some());
                if exists {
                    continue;
                }
                row.insert("archived_at".into(), Value::Timestamp(now));
                archive.insert(row)?;
                inserted += 1;
            }
            Ok(inserted)
        })?;
        Ok(moved)
    }
}

/// Fills exactly one of the sharding columns from the parent row, by priority.
///
/// `project_id` wins over `group_id`; rows whose parent has neither fall back
/// to `organization_id = fallback`.
pub struct ShardingFromParent {
    pub parents: &'static str,
    pub fallback: i64,
}

pub const SHARDING_COLUMNS: [&str; 3] = ["project_id", "group_id", "organization_id"];

#[async_trait]
impl MutationStep<MemoryStore> for ShardingFromParent {
    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let name = scope.table().path();
        let window = scope.window();

        let filled = store.transaction(|tables| {
            let parents = tables.get(self.parents).cloned().ok_or_else(|| {
                DbError::Write(format!("relation \"{}\" does not exist", self.parents))
            })?;
            let children = tables.table(&name)?;
            let mut filled = 0;

            for key in children.keys_in(window) {
                let Some(child) = children.get(&key) else {
                    continue;
                };
                let pending = SHARDING_COLUMNS
                    .iter()
                    .all(|c| child.get(*c).is_none_or(Value::is_null));
                if !pending {
                    continue;
                }

                let parent = child
                    .get("parent_id")
                    .and_then(Value::as_i64)
                    .and_then(|id| parents.get(&Key::Scalar(id)));
                let derived = ["project_id", "group_id"].into_iter().find_map(|column| {
                    parent
                        .and_then(|p| p.get(column))
                        .and_then(Value::as_i64)
                        .map(|id| (column, id))
                });
                let (column, value) = derived.unwrap_or(("organization_id", self.fallback));

                children.set(&key, column, Value::Int(value))?;
                filled += 1;
            }
            Ok(filled)
        })?;
        Ok(filled)
    }
}

/// Points rows at a shared reference row keyed by `(project_id, reference_hash)`,
/// creating it on first sight.
pub struct DeduplicateByHash {
    pub references: &'static str,
}

#[async_trait]
impl MutationStep<MemoryStore> for DeduplicateByHash {
    fn operation_name(&self) -> &str {
        "deduplicate_references"
    }

    async fn apply(&self, store: &MemoryStore, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        let name = scope.table().path();
        let window = scope.window();

        let linked = store.transaction(|tables| {
            let pending: Vec<(Key, Value, Value)> = tables
                .table(&name)?
                .rows()
                .filter(|(key, row)| {
                    window.contains(key)
                        && row.get("reference_id").is_none_or(Value::is_null)
                })
                .filter_map(|(key, row)| {
                    Some((key.clone(), row.get("project_id")?.clone(), row.get("reference_hash")?.clone()))
                })
                .collect();

            let mut linked = 0;
            for (key, project, hash) in pending {
                let references = tables.table(self.references)?;
                let columns = ["project_id", "reference_hash"];
                let values = [project.clone(), hash.clone()];
                let id = match references.find_by(&columns, &values) {
                    Some((existing, _)) => existing.clone(),
                    None => {
                        let id = references.next_id();
                        references.insert(row([
                            ("id", Value::Int(id)),
                            ("project_id", project),
                            ("reference_hash", hash),
                        ]))?
                    }
                };
                let id = id.as_scalar().map_or(Value::Null, Value::Int);
                tables.table(&name)?.set(&key, "reference_id", id)?;
                linked += 1;
            }
            Ok(linked)
        })?;
        Ok(linked)
    }
}
