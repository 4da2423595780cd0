use serde::Serialize;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// One timed mutation of a sub-batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimingSample {
    pub operation: String,
    pub sub_batch: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub rows_affected: u64,
}

#[derive(Debug, Default)]
struct InnerMetrics {
    timings: Vec<TimingSample>,
    rows_affected: u64,
    failure_count: u64,
}

/// Append-only record of sub-batch timings owned by one job.
///
/// Clones share the same samples, so a handle taken before `perform` observes
/// the run while it is in progress.
#[derive(Debug, Clone, Default)]
pub struct BatchMetrics {
    inner: Arc<Mutex<InnerMetrics>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub samples: usize,
    pub rows_affected: u64,
    pub failure_count: u64,
    pub total_ms: u128,
    pub max_ms: u128,
    pub mean_ms: f64,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InnerMetrics> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_timing(
        &self,
        operation: &str,
        sub_batch: usize,
        duration: Duration,
        rows_affected: u64,
    ) {
        let mut inner = self.lock();
        inner.rows_affected += rows_affected;
        inner.timings.push(TimingSample {
            operation: operation.to_string(),
            sub_batch,
            duration,
            rows_affected,
        });
    }

    /// Counts a failed mutation; failures never add a timing sample.
    pub fn record_failure(&self) {
        self.lock().failure_count += 1;
    }

    pub fn timings(&self) -> Vec<TimingSample> {
        self.lock().timings.clone()
    }

    pub fn timings_for(&self, operation: &str) -> Vec<Duration> {
        self.lock()
            .timings
            .iter()
            .filter(|sample| sample.operation == operation)
            .map(|sample| sample.duration)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().timings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows_affected(&self) -> u64 {
        self.lock().rows_affected
    }

    pub fn failure_count(&self) -> u64 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let total_ms: u128 = inner.timings.iter().map(|s| s.duration.as_millis()).sum();
        let max_ms = inner
            .timings
            .iter()
            .map(|s| s.duration.as_millis())
            .max()
            .unwrap_or(0);
        let mean_ms = if inner.timings.is_empty() {
            0.0
        } else {
            total_ms as f64 / inner.timings.len() as f64
        };

        MetricsSnapshot {
            samples: inner.timings.len(),
            rows_affected: inner.rows_affected,
            failure_count: inner.failure_count,
            total_ms,
            max_ms,
            mean_ms,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}
