//! Processors that finish the current saga on request.
//!
//! With [`CompletionMode::Manual`](crate::CompletionMode::Manual) the
//! orchestrator leaves an owned saga open; a route finishes it by sending the
//! exchange through a [`SagaActionProcessor`] while the saga is still
//! associated.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SagaError;
use crate::exchange::Exchange;
use crate::processor::Processor;
use crate::service::SagaService;

/// What to do with the current saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaAction {
    Complete,
    Compensate,
}

impl SagaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaAction::Complete => "complete",
            SagaAction::Compensate => "compensate",
        }
    }
}

impl std::fmt::Display for SagaAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaAction {
    type Err = SagaError;

    /// Accepts `complete`, `compensate`, or the `saga:` prefixed forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = s.trim();
        let action = action.strip_prefix("saga:").unwrap_or(action);
        match action {
            "complete" => Ok(SagaAction::Complete),
            "compensate" => Ok(SagaAction::Compensate),
            other => Err(SagaError::configuration(format!("unknown saga action '{other}'"))),
        }
    }
}

/// Completes or compensates the saga associated with the exchange.
pub struct SagaActionProcessor {
    service: Arc<dyn SagaService>,
    action: SagaAction,
}

impl SagaActionProcessor {
    pub fn new(service: Arc<dyn SagaService>, action: SagaAction) -> Self {
        Self { service, action }
    }

    pub fn complete(service: Arc<dyn SagaService>) -> Self {
        Self::new(service, SagaAction::Complete)
    }

    pub fn compensate(service: Arc<dyn SagaService>) -> Self {
        Self::new(service, SagaAction::Compensate)
    }

    async fn apply(&self, exchange: &Exchange) -> Result<(), SagaError> {
        let saga_id = exchange.saga_id().ok_or(SagaError::NoActiveSaga)?;
        let coordinator = self
            .service
            .get_saga(&saga_id)
            .await?
            .ok_or_else(|| SagaError::SagaNotFound(saga_id.clone()))?;

        tracing::info!(%saga_id, action = %self.action, "finishing saga on request");
        match self.action {
            SagaAction::Complete => coordinator.complete().await,
            SagaAction::Compensate => coordinator.compensate().await,
        }
    }
}

#[async_trait]
impl Processor for SagaActionProcessor {
    async fn process(&self, exchange: &mut Exchange) {
        if let Err(e) = self.apply(exchange).await {
            tracing::warn!(action = %self.action, error = %e, "saga action failed");
            exchange.set_error(e);
        }
    }
}
