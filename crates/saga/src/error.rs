//! Saga error types.

use common::SagaId;
use thiserror::Error;

use crate::propagation::Propagation;
use crate::state::SagaState;

/// Errors that can occur while orchestrating sagas.
///
/// Configuration errors are returned synchronously by the builder. Every
/// other variant is recorded on the [`Exchange`](crate::Exchange) being
/// processed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SagaError {
    /// The orchestrator was assembled from an invalid combination of settings.
    #[error("Invalid saga configuration: {0}")]
    Configuration(String),

    /// The propagation policy rejected the current saga association.
    #[error("Propagation {propagation} violated: {reason}")]
    PropagationViolation {
        propagation: Propagation,
        reason: String,
    },

    /// The saga is in a state that does not allow the requested operation.
    #[error("Cannot {operation} saga {saga_id} in state {actual}")]
    InvalidState {
        saga_id: SagaId,
        operation: &'static str,
        actual: SagaState,
    },

    /// The saga service failed.
    #[error("Saga service error: {0}")]
    Service(String),

    /// No saga is known under the given id.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// A saga action was requested but the exchange carries no saga.
    #[error("No active saga on exchange")]
    NoActiveSaga,

    /// A step refers to an endpoint that is not registered.
    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    /// A completion or compensation action kept failing.
    #[error("Saga action '{endpoint}' failed after {attempts} attempts: {reason}")]
    ActionFailed {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    /// Compensating a failed saga failed as well.
    #[error("Compensation of saga {saga_id} failed: {reason} (original error: {original})")]
    CompensationFailed {
        saga_id: SagaId,
        reason: String,
        original: Box<SagaError>,
    },

    /// The wrapped unit of work failed.
    #[error("Processing failed: {0}")]
    Processing(String),
}

impl SagaError {
    /// Shorthand for a [`SagaError::Processing`] error.
    pub fn processing(reason: impl Into<String>) -> Self {
        SagaError::Processing(reason.into())
    }

    /// Shorthand for a [`SagaError::Configuration`] error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        SagaError::Configuration(reason.into())
    }

    /// Returns true if this error was raised while assembling an orchestrator.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SagaError::Configuration(_))
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
