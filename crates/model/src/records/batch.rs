use crate::pagination::cursor::Key;
use serde::Serialize;
use std::fmt;

/// One window of keys handed to a mutation step. Both bounds are inclusive.
///
/// Produced by the sub-batch iterator, consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubBatch {
    /// Zero-based position of this window within the run.
    pub index: usize,
    pub start: Key,
    pub end: Key,
}

impl SubBatch {
    pub fn new(index: usize, start: Key, end: Key) -> Self {
        SubBatch { index, start, end }
    }

    pub fn contains(&self, key: &Key) -> bool {
        &self.start <= key && key <= &self.end
    }
}

impl fmt::Display for SubBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}, {}]", self.index, self.start, self.end)
    }
}
