use crate::{execution::errors::ConfigurationError, pagination::cursor::Key};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive key range `[start, end]` scanned by one job.
///
/// `start > end` is legal and denotes an empty range.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BatchRange {
    pub start: Key,
    pub end: Key,
}

impl BatchRange {
    pub fn new(start: impl Into<Key>, end: impl Into<Key>) -> Self {
        BatchRange {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, key: &Key) -> bool {
        &self.start <= key && key <= &self.end
    }

    /// Both bounds must carry one component per batch column.
    pub fn check_arity(&self, expected: usize) -> Result<(), ConfigurationError> {
        for key in [&self.start, &self.end] {
            if key.arity() != expected {
                return Err(ConfigurationError::KeyArity {
                    key: key.to_string(),
                    expected,
                    found: key.arity(),
                });
            }
        }
        Ok(())
    }

    /// The part of this range strictly after `key`, used to resume a run.
    pub fn remaining_after(&self, key: &Key) -> Option<BatchRange> {
        if key < &self.start {
            return Some(self.clone());
        }
        let start = key.successor()?;
        let remaining = BatchRange {
            start,
            end: self.end.clone(),
        };
        (!remaining.is_empty()).then_some(remaining)
    }
}

impl fmt::Display for BatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_when_start_exceeds_end() {
        assert!(BatchRange::new(10, 9).is_empty());
        assert!(!BatchRange::new(9, 9).is_empty());
    }

    #[test]
    fn checks_key_arity() {
        let range = BatchRange::new(vec![1, 1], vec![5, 5]);
        assert!(range.check_arity(2).is_ok());
        assert!(matches!(
            range.check_arity(1),
            Err(ConfigurationError::KeyArity {
                expected: 1,
                found: 2,
                ..
            })
        ));
    }

    #[test]
    fn remaining_after_narrows_range() {
        let range = BatchRange::new(1, 10);
        assert_eq!(range.remaining_after(&Key::Scalar(4)), Some(BatchRange::new(5, 10)));
        assert_eq!(range.remaining_after(&Key::Scalar(10)), None);
        assert_eq!(range.remaining_after(&Key::Scalar(0)), Some(range.clone()));
    }
}
