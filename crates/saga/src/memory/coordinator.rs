//! In-memory saga coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::coordinator::SagaCoordinator;
use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::exchange::Exchange;
use crate::memory::service::{Faults, Shared};
use crate::state::SagaState;
use crate::step::SagaStep;

/// A step that joined the saga, with its option values captured.
#[derive(Debug, Clone)]
struct JoinedStep {
    step: SagaStep,
    options: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    state: SagaState,
    steps: Vec<JoinedStep>,
}

/// Direction a saga is finished in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Complete,
    Compensate,
}

impl Outcome {
    fn operation(&self) -> &'static str {
        match self {
            Outcome::Complete => "complete",
            Outcome::Compensate => "compensate",
        }
    }
}

/// Coordinator of one saga held by an [`InMemorySagaService`].
///
/// Completion actions run in the order the steps joined; compensation
/// actions run in reverse order. Each action is retried up to the step's
/// (or the service's) attempt limit. A failing action does not prevent the
/// remaining ones from running; the first failure is reported once all have
/// been attempted.
///
/// [`InMemorySagaService`]: crate::memory::InMemorySagaService
#[derive(Debug, Clone)]
pub struct InMemorySagaCoordinator {
    id: SagaId,
    inner: Arc<Mutex<CoordinatorState>>,
    shared: Arc<Shared>,
}

impl InMemorySagaCoordinator {
    pub(crate) fn new(id: SagaId, shared: Arc<Shared>) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(CoordinatorState::default())),
            shared,
        }
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> SagaState {
        self.inner.lock().await.state
    }

    /// Returns the number of steps that joined the saga.
    pub async fn step_count(&self) -> usize {
        self.inner.lock().await.steps.len()
    }

    /// Schedules compensation of the saga once `timeout` has elapsed.
    fn schedule_timeout(&self, timeout: std::time::Duration) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if coordinator.state().await != SagaState::Active {
                return;
            }

            tracing::warn!(saga_id = %coordinator.id, ?timeout, "saga timed out, compensating");
            coordinator
                .shared
                .record(SagaEvent::saga_timed_out(&coordinator.id))
                .await;
            metrics::counter!("saga_timeouts_total").increment(1);

            if let Err(e) = coordinator.compensate().await {
                tracing::warn!(
                    saga_id = %coordinator.id,
                    error = %e,
                    "timeout compensation failed"
                );
            }
        });
    }

    /// Moves the saga towards `outcome` and returns the steps to finish.
    ///
    /// Returns `None` if the saga is already heading that way.
    async fn begin_finish(&self, outcome: Outcome) -> Result<Option<Vec<JoinedStep>>, SagaError> {
        let mut inner = self.inner.lock().await;
        let (already, next) = match outcome {
            Outcome::Complete => (inner.state.is_completing(), SagaState::Completing),
            Outcome::Compensate => (inner.state.is_compensating(), SagaState::Compensating),
        };

        if already {
            return Ok(None);
        }
        if inner.state != SagaState::Active {
            return Err(SagaError::InvalidState {
                saga_id: self.id.clone(),
                operation: outcome.operation(),
                actual: inner.state,
            });
        }

        inner.state = next;
        Ok(Some(inner.steps.clone()))
    }

    async fn finish(&self, outcome: Outcome) -> Result<(), SagaError> {
        let Some(mut steps) = self.begin_finish(outcome).await? else {
            tracing::debug!(
                saga_id = %self.id,
                operation = outcome.operation(),
                "already finishing"
            );
            return Ok(());
        };
        if outcome == Outcome::Compensate {
            steps.reverse();
        }

        let mut first_error = None;
        for joined in &steps {
            let uri = match outcome {
                Outcome::Complete => joined.step.completion(),
                Outcome::Compensate => joined.step.compensation(),
            };
            let Some(uri) = uri else {
                continue;
            };

            let attempts = joined
                .step
                .max_retries()
                .unwrap_or(self.shared.config.max_retry_attempts)
                .max(1);
            if let Err(e) = self.invoke_action(uri, &joined.options, attempts).await {
                tracing::error!(
                    saga_id = %self.id,
                    endpoint = uri,
                    error = %e,
                    "saga action failed"
                );
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        let (state, event) = match outcome {
            Outcome::Complete => (SagaState::Completed, SagaEvent::saga_completed(&self.id)),
            Outcome::Compensate => (SagaState::Compensated, SagaEvent::saga_compensated(&self.id)),
        };
        self.inner.lock().await.state = state;
        self.shared.record(event).await;
        tracing::info!(saga_id = %self.id, %state, "saga finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Runs one action endpoint, retrying on failure.
    async fn invoke_action(
        &self,
        uri: &str,
        options: &BTreeMap<String, Value>,
        attempts: u32,
    ) -> Result<(), SagaError> {
        let processor = self
            .shared
            .endpoints
            .get(uri)
            .ok_or_else(|| SagaError::EndpointNotFound(uri.to_string()))?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut exchange = Exchange::default();
            exchange.set_saga_id(Some(self.id.clone()));
            for (name, value) in options {
                exchange.set_header(name.clone(), value.clone());
            }

            processor.process(&mut exchange).await;

            let Some(error) = exchange.take_error() else {
                return Ok(());
            };

            self.shared
                .record(SagaEvent::action_failed(&self.id, uri, attempt, error.to_string()))
                .await;

            if attempt >= attempts {
                return Err(SagaError::ActionFailed {
                    endpoint: uri.to_string(),
                    attempts,
                    reason: error.to_string(),
                });
            }

            metrics::counter!("saga_action_retries_total").increment(1);
            tracing::debug!(
                saga_id = %self.id,
                endpoint = uri,
                attempt,
                error = %error,
                "retrying saga action"
            );
            tokio::time::sleep(self.shared.config.retry_delay).await;
        }
    }
}

#[async_trait]
impl SagaCoordinator for InMemorySagaCoordinator {
    fn id(&self) -> SagaId {
        self.id.clone()
    }

    #[tracing::instrument(skip_all, fields(saga_id = %self.id))]
    async fn begin_step(&self, exchange: &Exchange, step: &SagaStep) -> Result<(), SagaError> {
        Faults::check(&self.shared.faults.begin_step, "begin_step")?;

        for uri in [step.compensation(), step.completion()].into_iter().flatten() {
            if !self.shared.endpoints.contains(uri) {
                return Err(SagaError::EndpointNotFound(uri.to_string()));
            }
        }

        let options: BTreeMap<String, Value> = step
            .options()
            .iter()
            .filter_map(|(name, header)| {
                exchange
                    .header(header)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        {
            let mut inner = self.inner.lock().await;
            if !inner.state.can_begin_step() {
                return Err(SagaError::InvalidState {
                    saga_id: self.id.clone(),
                    operation: "begin step on",
                    actual: inner.state,
                });
            }
            inner.steps.push(JoinedStep {
                step: step.clone(),
                options,
            });
        }

        self.shared
            .record(SagaEvent::step_begun(
                &self.id,
                step.compensation(),
                step.completion(),
            ))
            .await;

        if let Some(timeout) = step.timeout() {
            self.schedule_timeout(timeout);
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(saga_id = %self.id))]
    async fn complete(&self) -> Result<(), SagaError> {
        self.shared
            .record(SagaEvent::completion_requested(&self.id))
            .await;
        Faults::check(&self.shared.faults.complete, "complete")?;
        self.finish(Outcome::Complete).await
    }

    #[tracing::instrument(skip_all, fields(saga_id = %self.id))]
    async fn compensate(&self) -> Result<(), SagaError> {
        self.shared
            .record(SagaEvent::compensation_requested(&self.id))
            .await;
        Faults::check(&self.shared.faults.compensate, "compensate")?;
        self.finish(Outcome::Compensate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SagaConfig;
    use crate::memory::{EndpointRegistry, InMemorySagaService};
    use crate::processor::{FnProcessor, Processor};
    use crate::service::SagaService;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records the saga id and headers each call receives.
    #[derive(Clone, Default)]
    struct RecordingEndpoint {
        calls: Arc<std::sync::Mutex<Vec<(String, Option<SagaId>, Option<Value>)>>>,
        name: &'static str,
        failures_left: Arc<AtomicUsize>,
    }

    impl RecordingEndpoint {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                ..Self::default()
            }
        }

        fn failing(name: &'static str, failures: usize) -> Self {
            let endpoint = Self::named(name);
            endpoint.failures_left.store(failures, Ordering::SeqCst);
            endpoint
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Processor for RecordingEndpoint {
        async fn process(&self, exchange: &mut Exchange) {
            self.calls.lock().unwrap().push((
                self.name.to_string(),
                exchange.saga_id(),
                exchange.header("order").cloned(),
            ));
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                exchange.set_error(SagaError::processing(format!("{} unavailable", self.name)));
            }
        }
    }

    fn fast_config(attempts: u32) -> SagaConfig {
        SagaConfig::default()
            .with_max_retry_attempts(attempts)
            .with_retry_delay(Duration::from_millis(1))
    }

    fn step(compensation: &str, completion: &str) -> SagaStep {
        SagaStep::builder()
            .compensation(compensation)
            .completion(completion)
            .option("order", "orderId")
            .build()
    }

    async fn coordinator_for(service: &InMemorySagaService) -> InMemorySagaCoordinator {
        let id = service.new_saga().await.unwrap().id();
        service.coordinator(&id).await.unwrap()
    }

    #[tokio::test]
    async fn test_complete_runs_completions_in_order() {
        let log = RecordingEndpoint::named("log");
        let first = RecordingEndpoint { name: "first", ..log.clone() };
        let second = RecordingEndpoint { name: "second", ..log.clone() };
        let endpoints = EndpointRegistry::new()
            .with("direct:first", first)
            .with("direct:second", second)
            .with("direct:undo", FnProcessor::new(|_: &mut Exchange| {}));
        let service = InMemorySagaService::with_config(fast_config(1), endpoints);
        let coordinator = coordinator_for(&service).await;

        let mut exchange = Exchange::default();
        exchange.set_header("orderId", "o-1");
        coordinator
            .begin_step(&exchange, &step("direct:undo", "direct:first"))
            .await
            .unwrap();
        coordinator
            .begin_step(&exchange, &step("direct:undo", "direct:second"))
            .await
            .unwrap();

        coordinator.complete().await.unwrap();

        let calls = log.calls.lock().unwrap().clone();
        let names: Vec<&str> = calls.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(calls.iter().all(|(_, id, _)| id.as_ref() == Some(&coordinator.id())));
        assert!(calls.iter().all(|(_, _, order)| order == &Some(json!("o-1"))));
        assert_eq!(coordinator.state().await, SagaState::Completed);
    }

    #[tokio::test]
    async fn test_compensate_runs_in_reverse_and_continues_after_failure() {
        let log = RecordingEndpoint::named("log");
        let first = RecordingEndpoint { name: "undo-first", ..log.clone() };
        let second = RecordingEndpoint::failing("undo-second", usize::MAX);
        let second_calls = second.clone();
        let endpoints = EndpointRegistry::new()
            .with("direct:undo-first", first)
            .with("direct:undo-second", second);
        let service = InMemorySagaService::with_config(fast_config(2), endpoints);
        let coordinator = coordinator_for(&service).await;

        let exchange = Exchange::default();
        coordinator
            .begin_step(&exchange, &SagaStep::builder().compensation("direct:undo-first").build())
            .await
            .unwrap();
        coordinator
            .begin_step(&exchange, &SagaStep::builder().compensation("direct:undo-second").build())
            .await
            .unwrap();

        let err = coordinator.compensate().await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::ActionFailed { ref endpoint, attempts: 2, .. }
                if endpoint == "direct:undo-second"
        ));

        assert_eq!(second_calls.call_count(), 2);
        assert_eq!(log.call_count(), 1);
        assert_eq!(coordinator.state().await, SagaState::Compensated);
        assert_eq!(
            service.count_events(&coordinator.id(), "ActionFailed").await,
            2
        );
    }

    #[tokio::test]
    async fn test_action_retried_until_success() {
        let flaky = RecordingEndpoint::failing("flaky", 2);
        let endpoints = EndpointRegistry::new().with("direct:flaky", flaky.clone());
        let service = InMemorySagaService::with_config(fast_config(5), endpoints);
        let coordinator = coordinator_for(&service).await;

        coordinator
            .begin_step(
                &Exchange::default(),
                &SagaStep::builder().completion("direct:flaky").build(),
            )
            .await
            .unwrap();
        coordinator.complete().await.unwrap();

        assert_eq!(flaky.call_count(), 3);
    }

    #[tokio::test]
    async fn test_step_retries_override_service_default() {
        let broken = RecordingEndpoint::failing("broken", usize::MAX);
        let endpoints = EndpointRegistry::new().with("direct:broken", broken.clone());
        let service = InMemorySagaService::with_config(fast_config(5), endpoints);
        let coordinator = coordinator_for(&service).await;

        coordinator
            .begin_step(
                &Exchange::default(),
                &SagaStep::builder()
                    .completion("direct:broken")
                    .max_retries(1)
                    .build(),
            )
            .await
            .unwrap();

        assert!(coordinator.complete().await.is_err());
        assert_eq!(broken.call_count(), 1);
    }

    #[tokio::test]
    async fn test_begin_step_rejects_unknown_endpoint() {
        let service = InMemorySagaService::new();
        let coordinator = coordinator_for(&service).await;

        let err = coordinator
            .begin_step(
                &Exchange::default(),
                &SagaStep::builder().compensation("direct:nowhere").build(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, SagaError::EndpointNotFound("direct:nowhere".to_string()));
        assert_eq!(coordinator.step_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let service = InMemorySagaService::new();
        let coordinator = coordinator_for(&service).await;

        coordinator.compensate().await.unwrap();
        coordinator.compensate().await.unwrap();

        let err = coordinator.complete().await.unwrap_err();
        assert!(matches!(
            err,
            SagaError::InvalidState {
                operation: "complete",
                actual: SagaState::Compensated,
                ..
            }
        ));

        let err = coordinator
            .begin_step(&Exchange::default(), &SagaStep::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_repeated_complete_is_idempotent() {
        let service = InMemorySagaService::new();
        let coordinator = coordinator_for(&service).await;

        coordinator.complete().await.unwrap();
        coordinator.complete().await.unwrap();

        let id = coordinator.id();
        assert_eq!(service.count_events(&id, "CompletionRequested").await, 2);
        assert_eq!(service.count_events(&id, "SagaCompleted").await, 1);
        assert!(coordinator.compensate().await.is_err());
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let service = InMemorySagaService::new();
        let coordinator = coordinator_for(&service).await;

        service.set_fail_on_begin_step(true);
        service.set_fail_on_complete(true);
        service.set_fail_on_compensate(true);

        assert!(
            coordinator
                .begin_step(&Exchange::default(), &SagaStep::empty())
                .await
                .is_err()
        );
        assert!(coordinator.complete().await.is_err());
        assert!(coordinator.compensate().await.is_err());
        assert_eq!(coordinator.state().await, SagaState::Active);
    }

    #[tokio::test]
    async fn test_timeout_compensates_active_saga() {
        let undo = RecordingEndpoint::named("undo");
        let endpoints = EndpointRegistry::new().with("direct:undo", undo.clone());
        let service = InMemorySagaService::with_config(fast_config(1), endpoints);
        let coordinator = coordinator_for(&service).await;

        coordinator
            .begin_step(
                &Exchange::default(),
                &SagaStep::builder()
                    .compensation("direct:undo")
                    .timeout(Duration::from_millis(10))
                    .build(),
            )
            .await
            .unwrap();

        for _ in 0..100 {
            if coordinator.state().await == SagaState::Compensated {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(coordinator.state().await, SagaState::Compensated);
        assert_eq!(undo.call_count(), 1);
        assert_eq!(service.count_events(&coordinator.id(), "SagaTimedOut").await, 1);
    }

    #[tokio::test]
    async fn test_timeout_ignored_after_completion() {
        let service = InMemorySagaService::new();
        let coordinator = coordinator_for(&service).await;

        coordinator
            .begin_step(
                &Exchange::default(),
                &SagaStep::builder().timeout(Duration::from_millis(5)).build(),
            )
            .await
            .unwrap();
        coordinator.complete().await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coordinator.state().await, SagaState::Completed);
        assert_eq!(service.count_events(&coordinator.id(), "SagaTimedOut").await, 0);
    }
}
