//! The saga service contract.

use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;

use crate::coordinator::SagaCoordinator;
use crate::error::SagaError;

/// Factory and registry for saga coordinators.
#[async_trait]
pub trait SagaService: Send + Sync {
    /// Starts a new saga.
    async fn new_saga(&self) -> Result<Arc<dyn SagaCoordinator>, SagaError>;

    /// Looks up a saga by id.
    ///
    /// Returns `Ok(None)` if the service does not know the id.
    async fn get_saga(&self, id: &SagaId) -> Result<Option<Arc<dyn SagaCoordinator>>, SagaError>;
}
