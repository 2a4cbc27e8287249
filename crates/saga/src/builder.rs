//! Builder for saga orchestrators.

use std::sync::Arc;

use crate::error::SagaError;
use crate::orchestrator::SagaProcessor;
use crate::processor::Processor;
use crate::propagation::{CompletionMode, Propagation};
use crate::service::SagaService;
use crate::step::SagaStep;

/// Assembles a [`SagaProcessor`].
///
/// Propagation, saga service and processor are required. Completion mode
/// defaults to [`CompletionMode::Auto`] and the step to an empty one.
#[derive(Default)]
pub struct SagaProcessorBuilder {
    propagation: Option<Propagation>,
    completion_mode: Option<CompletionMode>,
    step: Option<SagaStep>,
    service: Option<Arc<dyn SagaService>>,
    processor: Option<Arc<dyn Processor>>,
}

impl SagaProcessorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = Some(propagation);
        self
    }

    pub fn completion_mode(mut self, completion_mode: CompletionMode) -> Self {
        self.completion_mode = Some(completion_mode);
        self
    }

    pub fn step(mut self, step: SagaStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn service(mut self, service: Arc<dyn SagaService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Sets a processor that is shared with other parts of a route.
    pub fn shared_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Validates the configuration and builds the orchestrator.
    pub fn build(self) -> Result<SagaProcessor, SagaError> {
        let propagation = self
            .propagation
            .ok_or_else(|| SagaError::configuration("propagation must be set"))?;
        let service = self
            .service
            .ok_or_else(|| SagaError::configuration("saga service must be set"))?;
        let processor = self
            .processor
            .ok_or_else(|| SagaError::configuration("processor must be set"))?;

        SagaProcessor::new(
            propagation,
            service,
            processor,
            self.completion_mode.unwrap_or_default(),
            self.step.unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::Exchange;
    use crate::memory::InMemorySagaService;
    use crate::processor::FnProcessor;

    fn noop() -> FnProcessor<fn(&mut Exchange)> {
        FnProcessor::new(|_| {})
    }

    fn service() -> Arc<dyn SagaService> {
        Arc::new(InMemorySagaService::new())
    }

    #[test]
    fn test_build_with_defaults() {
        let saga = SagaProcessorBuilder::new()
            .propagation(Propagation::Required)
            .service(service())
            .processor(noop())
            .build()
            .unwrap();

        assert_eq!(saga.propagation(), Propagation::Required);
        assert_eq!(saga.completion_mode(), CompletionMode::Auto);
        assert!(saga.step().is_empty());
    }

    #[test]
    fn test_missing_propagation() {
        let err = SagaProcessorBuilder::new()
            .service(service())
            .processor(noop())
            .build()
            .unwrap_err();
        assert_eq!(err, SagaError::configuration("propagation must be set"));
    }

    #[test]
    fn test_missing_service_or_processor() {
        let err = SagaProcessorBuilder::new()
            .propagation(Propagation::Supports)
            .processor(noop())
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = SagaProcessorBuilder::new()
            .propagation(Propagation::Supports)
            .service(service())
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_every_propagation_builds_with_defaults() {
        for propagation in Propagation::ALL {
            let saga = SagaProcessor::builder()
                .propagation(propagation)
                .service(service())
                .processor(noop())
                .build()
                .unwrap();
            assert_eq!(saga.propagation(), propagation);
        }
    }

    #[test]
    fn test_parsed_propagation_dispatches() {
        let propagation: Propagation = "requires_new".parse().unwrap();
        let saga = SagaProcessor::builder()
            .propagation(propagation)
            .completion_mode(CompletionMode::Manual)
            .step(SagaStep::builder().compensation("direct:undo").build())
            .service(service())
            .processor(noop())
            .build()
            .unwrap();
        assert_eq!(saga.propagation(), Propagation::RequiresNew);
        assert_eq!(saga.completion_mode(), CompletionMode::Manual);
    }

    #[test]
    fn test_not_supported_rejects_step_and_mode() {
        let err = SagaProcessor::builder()
            .propagation(Propagation::NotSupported)
            .step(SagaStep::builder().completion("direct:done").build())
            .service(service())
            .processor(noop())
            .build()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = SagaProcessor::builder()
            .propagation(Propagation::NotSupported)
            .completion_mode(CompletionMode::Manual)
            .service(service())
            .processor(noop())
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_supports_rejects_manual_mode() {
        let err = SagaProcessor::builder()
            .propagation(Propagation::Supports)
            .completion_mode(CompletionMode::Manual)
            .service(service())
            .processor(noop())
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
