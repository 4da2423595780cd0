use chrono::{DateTime, Utc};
use engine_core::metrics::{MetricsSnapshot, TimingSample};
use model::pagination::{cursor::Key, range::BatchRange};
use serde::Serialize;

/// Machine readable outcome of one `perform` call, written by `backfill run`.
#[derive(Serialize, Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub table: String,
    pub operation: String,
    pub state: String,
    pub range: Option<BatchRange>,
    pub sub_batches: usize,
    pub rows_affected: u64,
    pub last_completed: Option<Key>,
    pub elapsed_ms: u128,
    pub attempts: usize,
    pub metrics: MetricsSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub timings: Vec<TimingSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::metrics::BatchMetrics;

    fn summary(error: Option<&str>) -> JobSummary {
        JobSummary {
            job_id: "copy-ci-builds-metadata".into(),
            table: "public.ci_builds".into(),
            operation: "update_all".into(),
            state: "failed".into(),
            range: Some(BatchRange::new(1, 100)),
            sub_batches: 2,
            rows_affected: 40,
            last_completed: Some(Key::Scalar(20)),
            elapsed_ms: 12,
            attempts: 1,
            metrics: BatchMetrics::new().snapshot(),
            timings: Vec::new(),
            error: error.map(str::to_string),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn failed_summary_carries_its_error() {
        let failed = summary(Some("duplicate key value"));
        assert!(!failed.succeeded());
        let json: serde_json::Value = serde_json::from_str(&failed.to_json().unwrap()).unwrap();
        assert_eq!(json["error"], "duplicate key value");
        assert_eq!(json["last_completed"], 20);

        let ok = summary(None);
        assert!(ok.succeeded());
        let json: serde_json::Value = serde_json::from_str(&ok.to_json().unwrap()).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("timings").is_none());
    }
}
