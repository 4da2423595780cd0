use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::trace;

/// The clock the pacing controller sleeps on.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default, Clone)]
pub struct RecordingPacer {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl Pacer for RecordingPacer {
    async fn pause(&self, duration: Duration) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

/// Throttles a job by sleeping a fixed, non-negative time between sub-batches.
#[derive(Clone)]
pub struct PacingController {
    pause: Duration,
    pacer: Arc<dyn Pacer>,
}

impl PacingController {
    pub fn new(pause: Duration) -> Self {
        PacingController {
            pause,
            pacer: Arc::new(TokioPacer),
        }
    }

    /// Negative values come from caller mistakes and mean "no pause".
    pub fn from_millis(pause_ms: i64) -> Self {
        Self::new(Duration::from_millis(pause_ms.max(0) as u64))
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// A zero pause never reaches the pacer.
    pub async fn between_sub_batches(&self) {
        if self.pause.is_zero() {
            return;
        }
        trace!(pause_ms = self.pause.as_millis() as u64, "Pausing before next sub-batch");
        self.pacer.pause(self.pause).await;
    }
}

impl std::fmt::Debug for PacingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacingController")
            .field("pause", &self.pause)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn negative_pause_is_clamped_and_skipped() {
        let pacer = RecordingPacer::new();
        let pacing = PacingController::from_millis(-9).with_pacer(Arc::new(pacer.clone()));

        assert_eq!(pacing.pause(), Duration::ZERO);
        pacing.between_sub_batches().await;
        assert!(pacer.calls().is_empty());
    }

    #[tokio::test]
    async fn forwards_positive_pause() {
        let pacer = RecordingPacer::new();
        let pacing = PacingController::from_millis(25).with_pacer(Arc::new(pacer.clone()));

        pacing.between_sub_batches().await;
        pacing.between_sub_batches().await;
        assert_eq!(pacer.calls(), vec![Duration::from_millis(25); 2]);
    }

    #[tokio::test]
    async fn tokio_pacer_sleeps() {
        let started = tokio::time::Instant::now();
        PacingController::from_millis(15).between_sub_batches().await;
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
