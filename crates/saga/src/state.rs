//! Saga lifecycle states.

use serde::{Deserialize, Serialize};

/// The state of a saga instance, as tracked by a saga service.
///
/// State transitions:
/// ```text
/// Active ──┬──► Completing ──► Completed
///          └──► Compensating ──► Compensated
/// ```
///
/// The orchestrator never inspects this; only saga services do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Steps may still join the saga.
    #[default]
    Active,

    /// Completion actions are running.
    Completing,

    /// Compensation actions are running.
    Compensating,

    /// All completion actions ran (terminal state).
    Completed,

    /// All compensation actions ran (terminal state).
    Compensated,
}

impl SagaState {
    /// Returns true if new steps can begin.
    pub fn can_begin_step(&self) -> bool {
        matches!(self, SagaState::Active)
    }

    /// Returns true if the saga can move towards completion.
    pub fn can_complete(&self) -> bool {
        matches!(self, SagaState::Active)
    }

    /// Returns true if the saga can move towards compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Active)
    }

    /// Returns true if the saga is completing or already completed.
    pub fn is_completing(&self) -> bool {
        matches!(self, SagaState::Completing | SagaState::Completed)
    }

    /// Returns true if the saga is compensating or already compensated.
    pub fn is_compensating(&self) -> bool {
        matches!(self, SagaState::Compensating | SagaState::Compensated)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Compensated)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Active => "Active",
            SagaState::Completing => "Completing",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
