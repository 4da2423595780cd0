use crate::{
    error::MutationError,
    step::{BatchScope, MutationStep},
};
use async_trait::async_trait;
use engine_config::settings::GateConfig;
use engine_core::context::env::Environment;
use model::execution::{errors::ConfigurationError, spec::BatchSpec};
use std::sync::Arc;
use tracing::debug;

/// Runs the wrapped step only when the deployment matches `gate`.
///
/// A closed gate turns every window into a no-op that still counts as attempted.
pub struct Gated<S: ?Sized + Sync + 'static> {
    inner: Arc<dyn MutationStep<S>>,
    gate: GateConfig,
    env: Arc<dyn Environment>,
}

impl<S: ?Sized + Sync + 'static> Gated<S> {
    pub fn new(inner: Arc<dyn MutationStep<S>>, gate: GateConfig, env: Arc<dyn Environment>) -> Self {
        Gated { inner, gate, env }
    }

    pub fn is_open(&self) -> bool {
        self.gate.is_open(self.env.as_ref())
    }
}

#[async_trait]
impl<S: ?Sized + Sync + 'static> MutationStep<S> for Gated<S> {
    fn operation_name(&self) -> &str {
        self.inner.operation_name()
    }

    fn validate(&self, spec: &BatchSpec) -> Result<(), ConfigurationError> {
        if self.gate.is_empty() {
            return Err(ConfigurationError::InvalidStep(
                "only_if needs at least one of 'saas' or 'feature'".to_string(),
            ));
        }
        self.inner.validate(spec)
    }

    async fn apply(&self, store: &S, scope: &BatchScope<'_>) -> Result<u64, MutationError> {
        if !self.is_open() {
            debug!(window = %scope.window(), gate = ?self.gate, "Gate closed, skipping window");
            return Ok(0);
        }
        self.inner.apply(store, scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::context::env::StaticEnvironment;
    use model::{
        core::identifiers::TableRef,
        pagination::cursor::{Key, KeyColumns},
        records::batch::SubBatch,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl MutationStep<()> for Counting {
        fn operation_name(&self) -> &str {
            "counting"
        }

        async fn apply(&self, _store: &(), _scope: &BatchScope<'_>) -> Result<u64, MutationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(5)
        }
    }

    fn saas_only() -> GateConfig {
        GateConfig {
            saas: Some(true),
            feature: None,
        }
    }

    async fn run(gated: &Gated<()>) -> u64 {
        let spec = BatchSpec::builder(TableRef::new("t"), KeyColumns::single("id"))
            .build()
            .unwrap();
        let window = SubBatch::new(0, Key::Scalar(1), Key::Scalar(2));
        gated.apply(&(), &BatchScope::new(&spec, &window)).await.unwrap()
    }

    #[tokio::test]
    async fn closed_gate_skips_the_inner_step() {
        let inner = Arc::new(Counting::default());
        let gated = Gated::<()>::new(
            inner.clone(),
            saas_only(),
            Arc::new(StaticEnvironment::new().saas(false)),
        );

        assert_eq!(run(&gated).await, 0);
        assert_eq!(inner.0.load(Ordering::SeqCst), 0);
        assert_eq!(gated.operation_name(), "counting");
    }

    #[tokio::test]
    async fn open_gate_delegates() {
        let inner = Arc::new(Counting::default());
        let gated = Gated::<()>::new(
            inner.clone(),
            saas_only(),
            Arc::new(StaticEnvironment::new().saas(true)),
        );

        assert_eq!(run(&gated).await, 5);
        assert_eq!(inner.0.load(Ordering::SeqCst), 1);
    }
}
