//! Saga propagation policies and completion modes.
//!
//! A propagation policy decides, given the saga already associated with an
//! exchange (if any), which coordinator is active while the wrapped work runs
//! and whether the orchestrator owns it:
//!
//! | Policy         | saga present                 | no saga                     |
//! |----------------|------------------------------|-----------------------------|
//! | `Required`     | join, begin step             | create (owned), begin step  |
//! | `RequiresNew`  | create (owned), begin step   | create (owned), begin step  |
//! | `Supports`     | join, begin step             | run without saga            |
//! | `NotSupported` | suspend for the inner work   | run without saga            |
//! | `Mandatory`    | join, begin step             | error                       |
//! | `Never`        | error                        | run without saga            |

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinator::SagaCoordinator;
use crate::error::SagaError;
use crate::service::SagaService;
use crate::step::SagaStep;

/// Whether an owned saga is finished by the orchestrator or by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionMode {
    /// Complete on success, compensate on failure.
    #[default]
    Auto,

    /// Leave completion to the caller.
    Manual,
}

impl CompletionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionMode::Auto => "AUTO",
            CompletionMode::Manual => "MANUAL",
        }
    }

    pub fn is_default(&self) -> bool {
        *self == CompletionMode::default()
    }
}

impl std::fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CompletionMode {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(CompletionMode::Auto),
            "MANUAL" => Ok(CompletionMode::Manual),
            other => Err(SagaError::configuration(format!(
                "unknown completion mode '{other}'"
            ))),
        }
    }
}

/// Transaction propagation policy of a saga orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    Required,
    RequiresNew,
    Supports,
    NotSupported,
    Mandatory,
    Never,
}

/// Outcome of a propagation decision.
pub(crate) struct Decision {
    /// Coordinator active while the inner work runs.
    pub coordinator: Option<Arc<dyn SagaCoordinator>>,
    /// Whether the orchestrator must complete or compensate the coordinator.
    pub owned: bool,
    /// Whether the step must be registered before the inner work runs.
    pub begin_step: bool,
}

impl Decision {
    fn join(coordinator: Arc<dyn SagaCoordinator>) -> Self {
        Self {
            coordinator: Some(coordinator),
            owned: false,
            begin_step: true,
        }
    }

    fn own(coordinator: Arc<dyn SagaCoordinator>) -> Self {
        Self {
            coordinator: Some(coordinator),
            owned: true,
            begin_step: true,
        }
    }

    fn without_saga() -> Self {
        Self {
            coordinator: None,
            owned: false,
            begin_step: false,
        }
    }
}

impl Propagation {
    pub const ALL: [Propagation; 6] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Supports,
        Propagation::NotSupported,
        Propagation::Mandatory,
        Propagation::Never,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Supports => "SUPPORTS",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Mandatory => "MANDATORY",
            Propagation::Never => "NEVER",
        }
    }

    /// Checks that a step and completion mode make sense for this policy.
    ///
    /// Policies that never own a saga reject a non-default completion mode.
    /// Policies that never run with a saga also reject a non-empty step.
    pub fn validate(
        &self,
        step: &SagaStep,
        completion_mode: CompletionMode,
    ) -> Result<(), SagaError> {
        match self {
            Propagation::Required | Propagation::RequiresNew => Ok(()),
            Propagation::Supports | Propagation::Mandatory => {
                self.require_default_mode(completion_mode)
            }
            Propagation::NotSupported | Propagation::Never => {
                if !step.is_empty() {
                    return Err(SagaError::configuration(format!(
                        "saga steps are not allowed with propagation {self}"
                    )));
                }
                self.require_default_mode(completion_mode)
            }
        }
    }

    fn require_default_mode(&self, completion_mode: CompletionMode) -> Result<(), SagaError> {
        if completion_mode.is_default() {
            Ok(())
        } else {
            Err(SagaError::configuration(format!(
                "completion mode {completion_mode} is not allowed with propagation {self}"
            )))
        }
    }

    /// Decides the coordinator for the inner work.
    ///
    /// `existing` is the coordinator associated with the exchange before the
    /// orchestrator ran. Creating a coordinator calls into the service.
    pub(crate) async fn decide(
        &self,
        existing: Option<Arc<dyn SagaCoordinator>>,
        service: &dyn SagaService,
    ) -> Result<Decision, SagaError> {
        match (self, existing) {
            (Propagation::Required, Some(existing)) => Ok(Decision::join(existing)),
            (Propagation::Required, None) | (Propagation::RequiresNew, _) => {
                let coordinator = service.new_saga().await?;
                tracing::debug!(saga_id = %coordinator.id(), propagation = %self, "created saga");
                Ok(Decision::own(coordinator))
            }
            (Propagation::Supports | Propagation::Mandatory, Some(existing)) => {
                Ok(Decision::join(existing))
            }
            (Propagation::Supports | Propagation::Never | Propagation::NotSupported, None) => {
                Ok(Decision::without_saga())
            }
            (Propagation::NotSupported, Some(existing)) => {
                tracing::debug!(saga_id = %existing.id(), "suspending saga");
                Ok(Decision::without_saga())
            }
            (Propagation::Mandatory, None) => Err(SagaError::PropagationViolation {
                propagation: *self,
                reason: "no active saga found".to_string(),
            }),
            (Propagation::Never, Some(existing)) => Err(SagaError::PropagationViolation {
                propagation: *self,
                reason: format!("saga {} is already active", existing.id()),
            }),
        }
    }
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = SagaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Propagation::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| SagaError::configuration(format!("unknown propagation '{s}'")))
    }
}
