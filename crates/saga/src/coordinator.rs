//! The saga coordinator contract.

use async_trait::async_trait;
use common::SagaId;

use crate::error::SagaError;
use crate::exchange::Exchange;
use crate::step::SagaStep;

/// One saga instance, owned and implemented by a saga service.
///
/// The orchestrator only calls into a coordinator; it never inspects its
/// state. Implementations must be safe to share across concurrent exchanges.
#[async_trait]
pub trait SagaCoordinator: Send + Sync {
    /// Returns the saga's identifier.
    fn id(&self) -> SagaId;

    /// Registers a step with the saga.
    ///
    /// The exchange is the one entering the step; implementations may read
    /// headers from it to capture the step's options.
    async fn begin_step(&self, exchange: &Exchange, step: &SagaStep) -> Result<(), SagaError>;

    /// Completes the saga, running its completion actions.
    async fn complete(&self) -> Result<(), SagaError>;

    /// Compensates the saga, running its compensation actions.
    async fn compensate(&self) -> Result<(), SagaError>;
}
