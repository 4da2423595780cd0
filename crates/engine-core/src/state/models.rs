use chrono::{DateTime, Utc};
use model::pagination::{cursor::Key, range::BatchRange};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointStage {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for CheckpointStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckpointStage::Running => "running",
            CheckpointStage::Completed => "completed",
            CheckpointStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Last committed position of one job.
///
/// Keys are stored as raw components so the record stays bincode friendly.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub job_id: String,
    pub table: String,
    pub range_start: Vec<i64>,
    pub range_end: Vec<i64>,
    pub last_completed: Option<Vec<i64>>,
    pub sub_batches_done: u64,
    pub rows_affected: u64,
    pub stage: CheckpointStage,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(job_id: &str, table: &str, range: &BatchRange) -> Self {
        Checkpoint {
            job_id: job_id.to_string(),
            table: table.to_string(),
            range_start: range.start.components().to_vec(),
            range_end: range.end.components().to_vec(),
            last_completed: None,
            sub_batches_done: 0,
            rows_affected: 0,
            stage: CheckpointStage::Running,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn range(&self) -> BatchRange {
        BatchRange {
            start: Key::from_components(self.range_start.clone()),
            end: Key::from_components(self.range_end.clone()),
        }
    }

    pub fn last_completed_key(&self) -> Option<Key> {
        self.last_completed.clone().map(Key::from_components)
    }

    /// Records a committed sub-batch ending at `key`.
    pub fn advance(&mut self, key: &Key, rows_affected: u64) {
        self.last_completed = Some(key.components().to_vec());
        self.sub_batches_done += 1;
        self.rows_affected += rows_affected;
        self.stage = CheckpointStage::Running;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self) {
        self.stage = CheckpointStage::Completed;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, error: impl fmt::Display) {
        self.stage = CheckpointStage::Failed;
        self.last_error = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    /// Keys yet to be processed, `None` once the range is exhausted.
    pub fn remaining(&self) -> Option<BatchRange> {
        let range = self.range();
        match self.last_completed_key() {
            Some(key) => range.remaining_after(&key),
            None => (!range.is_empty()).then_some(range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuilt_range_matches_single_column_tuple_bounds() {
        let configured = BatchRange::new(vec![1], vec![100]);
        let mut cp = Checkpoint::new("users-backfill", "users", &configured);
        cp.advance(&Key::Tuple(vec![40]), 40);

        assert_eq!(cp.range(), configured);
        assert_eq!(cp.last_completed_key(), Some(Key::Tuple(vec![40])));
        assert_eq!(cp.remaining(), Some(BatchRange::new(41, 100)));
    }
}
