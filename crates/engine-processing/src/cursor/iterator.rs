use crate::cursor::arithmetic::ScalarWindows;
use connectors::sql::base::{error::DbError, probe::KeyProbe};
use model::{
    core::identifiers::TableRef,
    execution::{errors::ConfigurationError, spec::BatchSpec},
    pagination::{
        cursor::{CursorStrategy, Key, KeyColumns},
        range::BatchRange,
    },
    records::batch::SubBatch,
};
use tracing::trace;

enum WindowSource {
    /// Next window is the next `size` existing keys after `after`.
    Keyset { after: Option<Key> },
    Arithmetic(ScalarWindows),
}

/// Carves a [`BatchRange`] into ascending, disjoint, inclusive sub-batches.
///
/// The sequence is lazy and cannot be restarted; each call to
/// [`next_window`](Self::next_window) selects one more window.
pub struct SubBatchIterator<'a, P: KeyProbe + ?Sized> {
    probe: &'a P,
    table: &'a TableRef,
    columns: &'a KeyColumns,
    range: BatchRange,
    size: usize,
    source: WindowSource,
    index: usize,
    finished: bool,
}

impl<'a, P: KeyProbe + ?Sized> SubBatchIterator<'a, P> {
    pub fn new(probe: &'a P, spec: &'a BatchSpec, range: BatchRange) -> Result<Self, ConfigurationError> {
        range.check_arity(spec.key_columns().len())?;
        let source = Self::source_for(spec.strategy(), &range, spec.sub_batch_size())?;

        Ok(SubBatchIterator {
            probe,
            table: spec.table(),
            columns: spec.key_columns(),
            finished: range.is_empty(),
            range,
            size: spec.sub_batch_size(),
            source,
            index: 0,
        })
    }

    fn source_for(
        strategy: CursorStrategy,
        range: &BatchRange,
        size: usize,
    ) -> Result<WindowSource, ConfigurationError> {
        match strategy {
            CursorStrategy::Keyset => Ok(WindowSource::Keyset { after: None }),
            CursorStrategy::Arithmetic => {
                let (Some(start), Some(end)) = (range.start.as_scalar(), range.end.as_scalar())
                else {
                    return Err(ConfigurationError::ArithmeticCompositeKey);
                };
                Ok(WindowSource::Arithmetic(ScalarWindows::new(start, end, size)))
            }
        }
    }

    /// Skips every key up to and including `key`.
    pub fn resume_after(mut self, key: &Key) -> Result<Self, ConfigurationError> {
        match self.range.remaining_after(key) {
            Some(remaining) => {
                let strategy = match self.source {
                    WindowSource::Keyset { .. } => CursorStrategy::Keyset,
                    WindowSource::Arithmetic(_) => CursorStrategy::Arithmetic,
                };
                self.source = Self::source_for(strategy, &remaining, self.size)?;
                self.range = remaining;
            }
            None => self.finished = true,
        }
        Ok(self)
    }

    /// The part of the key space still to be visited at construction time.
    pub fn range(&self) -> &BatchRange {
        &self.range
    }

    pub async fn next_window(&mut self) -> Result<Option<SubBatch>, DbError> {
        if self.finished {
            return Ok(None);
        }

        let bounds = match &mut self.source {
            WindowSource::Arithmetic(windows) => windows
                .next()
                .map(|(start, end)| (Key::Scalar(start), Key::Scalar(end))),
            WindowSource::Keyset { after } => {
                let found = self
                    .probe
                    .next_window(self.table, self.columns, &self.range, after.as_ref(), self.size)
                    .await?;

                if let (Some((_, last)), Some(previous)) = (&found, after.as_ref())
                    && last <= previous
                {
                    return Err(DbError::Unknown(format!(
                        "key probe did not advance past {previous} on {}",
                        self.table
                    )));
                }
                if let Some((_, last)) = &found {
                    *after = Some(last.clone());
                }
                found
            }
        };

        let Some((start, end)) = bounds else {
            self.finished = true;
            return Ok(None);
        };

        if end >= self.range.end {
            self.finished = true;
        }

        let window = SubBatch::new(self.index, start, end);
        self.index += 1;
        trace!(window = %window, "Selected sub-batch");
        Ok(Some(window))
    }

    /// Drains up to `limit` windows, reporting whether more remained.
    pub async fn collect_windows(
        mut self,
        limit: Option<usize>,
    ) -> Result<(Vec<SubBatch>, bool), DbError> {
        let mut windows = Vec::new();
        while let Some(window) = self.next_window().await? {
            windows.push(window);
            if limit.is_some_and(|limit| windows.len() >= limit) {
                let more = !self.finished;
                return Ok((windows, more));
            }
        }
        Ok((windows, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::KeySpace;
    use proptest::prelude::*;

    fn spec(columns: KeyColumns, size: i64, strategy: CursorStrategy) -> BatchSpec {
        BatchSpec::builder(TableRef::new("events"), columns)
            .sub_batch_size(size)
            .strategy(strategy)
            .build()
            .unwrap()
    }

    async fn drain<P: KeyProbe + ?Sized>(mut iter: SubBatchIterator<'_, P>) -> Vec<SubBatch> {
        let mut out = Vec::new();
        while let Some(window) = iter.next_window().await.unwrap() {
            out.push(window);
        }
        out
    }

    fn bounds(windows: &[SubBatch]) -> Vec<(Key, Key)> {
        windows.iter().map(|w| (w.start.clone(), w.end.clone())).collect()
    }

    #[tokio::test]
    async fn keyset_windows_follow_existing_keys() {
        let keys = KeySpace::scalars([1, 2, 5, 9, 10, 11, 40]);
        let spec = spec(KeyColumns::single("id"), 3, CursorStrategy::Keyset);
        let iter = SubBatchIterator::new(&keys, &spec, BatchRange::new(2, 40)).unwrap();

        let windows = drain(iter).await;
        assert_eq!(
            bounds(&windows),
            vec![
                (Key::Scalar(2), Key::Scalar(9)),
                (Key::Scalar(10), Key::Scalar(40)),
            ]
        );
        assert_eq!(windows[1].index, 1);
    }

    #[tokio::test]
    async fn arithmetic_windows_ignore_the_store() {
        let keys = KeySpace::scalars([]);
        let spec = spec(KeyColumns::single("id"), 4, CursorStrategy::Arithmetic);
        let iter = SubBatchIterator::new(&keys, &spec, BatchRange::new(1, 10)).unwrap();

        assert_eq!(
            bounds(&drain(iter).await),
            vec![
                (Key::Scalar(1), Key::Scalar(4)),
                (Key::Scalar(5), Key::Scalar(8)),
                (Key::Scalar(9), Key::Scalar(10)),
            ]
        );
    }

    #[tokio::test]
    async fn empty_range_yields_nothing() {
        let keys = KeySpace::scalars([1, 2, 3]);
        let spec = spec(KeyColumns::single("id"), 2, CursorStrategy::Keyset);
        let mut iter = SubBatchIterator::new(&keys, &spec, BatchRange::new(3, 1)).unwrap();
        assert_eq!(iter.next_window().await.unwrap(), None);
        assert_eq!(keys.probe_calls(), 0);
    }

    #[tokio::test]
    async fn composite_keys_are_ordered_lexicographically() {
        let keys = KeySpace::tuples([[1, 7], [1, 9], [2, 1], [2, 3], [3, 0]]);
        let spec = spec(
            KeyColumns::composite(&["deployment_id", "merge_request_id"]),
            2,
            CursorStrategy::Keyset,
        );
        let range = BatchRange::new(vec![1, 8], vec![2, 3]);
        let iter = SubBatchIterator::new(&keys, &spec, range).unwrap();

        assert_eq!(
            bounds(&drain(iter).await),
            vec![
                (Key::Tuple(vec![1, 9]), Key::Tuple(vec![2, 1])),
                (Key::Tuple(vec![2, 3]), Key::Tuple(vec![2, 3])),
            ]
        );
    }

    #[tokio::test]
    async fn resumes_strictly_after_a_key() {
        let keys = KeySpace::scalars(1..=10);
        let spec = spec(KeyColumns::single("id"), 4, CursorStrategy::Keyset);
        let iter = SubBatchIterator::new(&keys, &spec, BatchRange::new(1, 10))
            .unwrap()
            .resume_after(&Key::Scalar(6))
            .unwrap();

        assert_eq!(
            bounds(&drain(iter).await),
            vec![(Key::Scalar(7), Key::Scalar(10))]
        );

        let done = SubBatchIterator::new(&keys, &spec, BatchRange::new(1, 10))
            .unwrap()
            .resume_after(&Key::Scalar(10))
            .unwrap();
        assert!(drain(done).await.is_empty());
    }

    #[tokio::test]
    async fn rejects_mismatched_range_arity() {
        let keys = KeySpace::scalars([1]);
        let spec = spec(KeyColumns::single("id"), 2, CursorStrategy::Keyset);
        let result = SubBatchIterator::new(&keys, &spec, BatchRange::new(vec![1, 1], vec![2, 2]));
        assert!(matches!(result, Err(ConfigurationError::KeyArity { .. })));
    }

    #[tokio::test]
    async fn collect_windows_reports_truncation() {
        let keys = KeySpace::scalars(1..=10);
        let spec = spec(KeyColumns::single("id"), 3, CursorStrategy::Keyset);

        let iter = SubBatchIterator::new(&keys, &spec, BatchRange::new(1, 10)).unwrap();
        let (windows, more) = iter.collect_windows(Some(2)).await.unwrap();
        assert_eq!(windows.len(), 2);
        assert!(more);

        let iter = SubBatchIterator::new(&keys, &spec, BatchRange::new(1, 10)).unwrap();
        let (windows, more) = iter.collect_windows(None).await.unwrap();
        assert_eq!(windows.len(), 4);
        assert!(!more);
    }

    proptest! {
        #[test]
        fn keyset_windows_cover_each_key_once(
            ids in proptest::collection::btree_set(0i64..500, 0..120),
            lo in 0i64..500,
            span in 0i64..500,
            size in 1i64..40,
        ) {
            let hi = lo + span;
            let keys = KeySpace::scalars(ids.iter().copied());
            let spec = spec(KeyColumns::single("id"), size, CursorStrategy::Keyset);
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let windows = runtime.block_on(async {
                drain(SubBatchIterator::new(&keys, &spec, BatchRange::new(lo, hi)).unwrap()).await
            });

            let expected: Vec<i64> = ids.range(lo..=hi).copied().collect();
            let mut seen = Vec::new();
            for window in &windows {
                let members: Vec<i64> = expected
                    .iter()
                    .copied()
                    .filter(|id| window.contains(&Key::Scalar(*id)))
                    .collect();
                prop_assert!(!members.is_empty());
                prop_assert!(members.len() <= size as usize);
                seen.extend(members);
            }
            for pair in windows.windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
            prop_assert_eq!(seen, expected);
        }
    }
}
