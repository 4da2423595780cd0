/// Fixed-width slices of an inclusive integer range: `[s, s + size - 1]`, ...
///
/// The last slice is clipped to `end`. Never overflows, even at `i64::MAX`.
#[derive(Debug, Clone)]
pub struct ScalarWindows {
    next: Option<i64>,
    end: i64,
    size: u64,
}

impl ScalarWindows {
    /// `size` must be positive; an empty range (`start > end`) yields nothing.
    pub fn new(start: i64, end: i64, size: usize) -> Self {
        ScalarWindows {
            next: (start <= end).then_some(start),
            end,
            size: size.max(1) as u64,
        }
    }
}

impl Iterator for ScalarWindows {
    type Item = (i64, i64);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let width = self.size - 1;
        let end = start
            .checked_add_unsigned(width)
            .map_or(self.end, |e| e.min(self.end));

        self.next = if end >= self.end { None } else { Some(end + 1) };
        Some((start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            None => (0, Some(0)),
            Some(start) => {
                let span = (self.end as i128 - start as i128 + 1) as u128;
                let count = span.div_ceil(self.size as u128);
                let count = usize::try_from(count).unwrap_or(usize::MAX);
                (count, Some(count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slices_with_clipped_tail() {
        let windows: Vec<_> = ScalarWindows::new(1, 10, 4).collect();
        assert_eq!(windows, vec![(1, 4), (5, 8), (9, 10)]);
    }

    #[test]
    fn empty_and_single_key_ranges() {
        assert_eq!(ScalarWindows::new(5, 4, 3).count(), 0);
        assert_eq!(ScalarWindows::new(7, 7, 100).collect::<Vec<_>>(), vec![(7, 7)]);
    }

    #[test]
    fn survives_extreme_bounds() {
        let windows: Vec<_> = ScalarWindows::new(i64::MAX - 2, i64::MAX, 2).collect();
        assert_eq!(windows, vec![(i64::MAX - 2, i64::MAX - 1), (i64::MAX, i64::MAX)]);

        let full: Vec<_> = ScalarWindows::new(i64::MIN, i64::MAX, usize::MAX).collect();
        assert_eq!(full, vec![(i64::MIN, i64::MAX - 1), (i64::MAX, i64::MAX)]);
    }

    proptest! {
        #[test]
        fn windows_partition_the_range(
            start in -1_000i64..1_000,
            len in 0i64..2_000,
            size in 1usize..300,
        ) {
            let end = start + len - 1;
            let windows: Vec<_> = ScalarWindows::new(start, end, size).collect();

            if len == 0 {
                prop_assert!(windows.is_empty());
            } else {
                prop_assert_eq!(windows.first().map(|w| w.0), Some(start));
                prop_assert_eq!(windows.last().map(|w| w.1), Some(end));
            }

            for (lo, hi) in &windows {
                prop_assert!(lo <= hi);
                prop_assert!((hi - lo + 1) as usize <= size);
            }
            for pair in windows.windows(2) {
                // No gap and no overlap between neighbours.
                prop_assert_eq!(pair[0].1 + 1, pair[1].0);
            }

            let covered: i64 = windows.iter().map(|(lo, hi)| hi - lo + 1).sum();
            prop_assert_eq!(covered, len.max(0));
            prop_assert_eq!(ScalarWindows::new(start, end, size).size_hint().0, windows.len());
        }
    }
}
