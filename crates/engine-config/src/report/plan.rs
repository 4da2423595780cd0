use model::{pagination::range::BatchRange, records::batch::SubBatch};
use serde::Serialize;

/// Windows a run would process, produced without writing anything.
#[derive(Serialize, Debug, Clone, Default)]
pub struct PlanReport {
    pub job_id: String,
    pub table: String,
    pub range: Option<BatchRange>,
    pub sub_batch_size: usize,
    pub pause_ms: u64,
    pub windows: Vec<SubBatch>,
    /// Set when listing stopped at the requested limit.
    pub truncated: bool,
}

impl PlanReport {
    /// Lower bound of the total sleep between windows.
    pub fn estimated_pause_ms(&self) -> u64 {
        let gaps = self.windows.len().saturating_sub(1) as u64;
        gaps.saturating_mul(self.pause_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::pagination::cursor::Key;

    #[test]
    fn pauses_only_between_windows() {
        let mut report = PlanReport {
            pause_ms: 50,
            ..Default::default()
        };
        assert_eq!(report.estimated_pause_ms(), 0);

        report.windows = (0..4)
            .map(|i| SubBatch::new(i, Key::Scalar(i as i64 * 10), Key::Scalar(i as i64 * 10 + 9)))
            .collect();
        assert_eq!(report.estimated_pause_ms(), 150);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["windows"][1]["start"], 10);
    }
}
