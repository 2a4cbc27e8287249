//! The saga orchestrator.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::SagaId;
use futures_util::FutureExt;
use serde_json::Value;

use crate::builder::SagaProcessorBuilder;
use crate::coordinator::SagaCoordinator;
use crate::error::SagaError;
use crate::exchange::{Exchange, SAGA_LONG_RUNNING_ACTION};
use crate::processor::Processor;
use crate::propagation::{CompletionMode, Propagation};
use crate::service::SagaService;
use crate::step::SagaStep;

/// Wraps a processor in a saga scope.
///
/// For every exchange the orchestrator:
/// 1. resolves the saga already associated with the exchange,
/// 2. lets its [`Propagation`] decide which saga is active and who owns it,
/// 3. stores that association on the exchange,
/// 4. registers its [`SagaStep`] with the saga when the policy asks for it,
/// 5. runs the wrapped processor,
/// 6. completes or compensates an owned saga in [`CompletionMode::Auto`],
///
/// and finally restores the association the exchange arrived with. The
/// restore runs on every path, including a panic in the saga service or a
/// coordinator, so nested orchestrators see a strict stack of associations.
///
/// The orchestrator keeps no per-exchange state and can be shared freely.
pub struct SagaProcessor {
    propagation: Propagation,
    service: Arc<dyn SagaService>,
    processor: Arc<dyn Processor>,
    completion_mode: CompletionMode,
    step: SagaStep,
}

impl SagaProcessor {
    /// Creates an orchestrator, validating the step and completion mode
    /// against the propagation policy.
    pub fn new(
        propagation: Propagation,
        service: Arc<dyn SagaService>,
        processor: Arc<dyn Processor>,
        completion_mode: CompletionMode,
        step: SagaStep,
    ) -> Result<Self, SagaError> {
        propagation.validate(&step, completion_mode)?;
        Ok(Self {
            propagation,
            service,
            processor,
            completion_mode,
            step,
        })
    }

    /// Creates a builder for an orchestrator.
    pub fn builder() -> SagaProcessorBuilder {
        SagaProcessorBuilder::new()
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn completion_mode(&self) -> CompletionMode {
        self.completion_mode
    }

    pub fn step(&self) -> &SagaStep {
        &self.step
    }

    /// Processes an exchange in the background and reports through `callback`.
    ///
    /// Returns `false` immediately: completion is never synchronous. The
    /// callback receives the finished exchange exactly once. Must be called
    /// from within a tokio runtime.
    pub fn process_with_callback<F>(self: &Arc<Self>, mut exchange: Exchange, callback: F) -> bool
    where
        F: FnOnce(Exchange, bool) + Send + 'static,
    {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.orchestrate(&mut exchange).await;
            callback(exchange, false);
        });
        false
    }

    #[tracing::instrument(
        skip_all,
        fields(propagation = %self.propagation, exchange_id = %exchange.id())
    )]
    async fn orchestrate(&self, exchange: &mut Exchange) {
        let started = Instant::now();
        metrics::counter!("saga_orchestrations_total", "propagation" => self.propagation.as_str())
            .increment(1);

        // Raw header value, so that finalize puts back exactly what was there.
        let previous = exchange.header(SAGA_LONG_RUNNING_ACTION).cloned();
        let previous_id = previous.as_ref().and_then(Value::as_str).map(SagaId::from);

        let scope = AssertUnwindSafe(self.run_scope(exchange, previous_id.as_ref()))
            .catch_unwind()
            .await;
        if scope.is_err() {
            tracing::error!("saga scope panicked");
            exchange.set_error(SagaError::processing("saga scope panicked"));
        }
        self.finalize(exchange, previous);

        metrics::histogram!("saga_orchestration_duration_seconds")
            .record(started.elapsed().as_secs_f64());
    }

    /// Everything between capturing and restoring the association.
    async fn run_scope(&self, exchange: &mut Exchange, previous: Option<&SagaId>) {
        let existing = match self.resolve(previous).await {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(error = %e, "failed to resolve current saga");
                exchange.set_error(e);
                return;
            }
        };

        let decision = match self.propagation.decide(existing, self.service.as_ref()).await {
            Ok(decision) => decision,
            Err(e) => {
                if matches!(e, SagaError::PropagationViolation { .. }) {
                    metrics::counter!(
                        "saga_propagation_violations_total",
                        "propagation" => self.propagation.as_str()
                    )
                    .increment(1);
                }
                tracing::warn!(error = %e, "propagation rejected exchange");
                exchange.set_error(e);
                return;
            }
        };

        let coordinator = decision.coordinator;
        exchange.set_saga_id(coordinator.as_ref().map(|c| c.id()));

        if let Some(coordinator) = coordinator.as_ref().filter(|_| decision.begin_step) {
            if let Err(e) = coordinator.begin_step(exchange, &self.step).await {
                tracing::warn!(
                    saga_id = %coordinator.id(),
                    error = %e,
                    "failed to begin saga step"
                );
                exchange.set_error(e);
                return;
            }
        }

        self.run_inner(exchange).await;

        match coordinator {
            Some(coordinator) if decision.owned => {
                self.complete_owned(exchange, coordinator.as_ref()).await;
            }
            _ => {}
        }
    }

    /// Looks up the saga the exchange arrived with.
    async fn resolve(
        &self,
        previous: Option<&SagaId>,
    ) -> Result<Option<Arc<dyn SagaCoordinator>>, SagaError> {
        let Some(id) = previous else {
            return Ok(None);
        };

        let coordinator = self.service.get_saga(id).await?;
        if coordinator.is_none() {
            tracing::warn!(
                saga_id = %id,
                "associated saga is unknown to the saga service, ignoring it"
            );
        }
        Ok(coordinator)
    }

    /// Runs the wrapped processor, turning a panic into an exchange error.
    async fn run_inner(&self, exchange: &mut Exchange) {
        let outcome = AssertUnwindSafe(self.processor.process(exchange))
            .catch_unwind()
            .await;

        if outcome.is_err() {
            tracing::error!("saga scope processor panicked");
            exchange.set_error(SagaError::processing("processor panicked"));
        }
    }

    /// Completes or compensates a saga this orchestrator created.
    async fn complete_owned(&self, exchange: &mut Exchange, coordinator: &dyn SagaCoordinator) {
        let saga_id = coordinator.id();

        if self.completion_mode == CompletionMode::Manual {
            tracing::debug!(%saga_id, "manual completion, leaving saga open");
            return;
        }

        match exchange.take_error() {
            None => {
                if let Err(e) = coordinator.complete().await {
                    tracing::error!(%saga_id, error = %e, "failed to complete saga");
                    exchange.set_error(e);
                    return;
                }
                metrics::counter!("saga_completions_total").increment(1);
                tracing::info!(%saga_id, "saga completed");
            }
            Some(original) => {
                tracing::info!(%saga_id, error = %original, "compensating saga");
                match coordinator.compensate().await {
                    Ok(()) => {
                        metrics::counter!("saga_compensations_total").increment(1);
                        exchange.set_error(original);
                    }
                    Err(e) => {
                        tracing::error!(%saga_id, error = %e, "failed to compensate saga");
                        exchange.set_error(SagaError::CompensationFailed {
                            saga_id,
                            reason: e.to_string(),
                            original: Box::new(original),
                        });
                    }
                }
            }
        }
    }

    /// Restores the association the exchange arrived with.
    fn finalize(&self, exchange: &mut Exchange, previous: Option<Value>) {
        match previous {
            Some(value) => exchange.set_header(SAGA_LONG_RUNNING_ACTION, value),
            None => {
                exchange.remove_header(SAGA_LONG_RUNNING_ACTION);
            }
        }
    }
}

#[async_trait]
impl Processor for SagaProcessor {
    async fn process(&self, exchange: &mut Exchange) {
        self.orchestrate(exchange).await
    }
}

impl std::fmt::Debug for SagaProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaProcessor")
            .field("propagation", &self.propagation)
            .field("completion_mode", &self.completion_mode)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}
