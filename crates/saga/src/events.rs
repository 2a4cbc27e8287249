//! Saga journal events.
//!
//! Saga services record what happened to each saga as a sequence of these
//! events. They are informational: the orchestrator never reads them.

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

/// Something that happened to a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// A saga was created.
    SagaCreated(SagaData),

    /// A step joined the saga.
    StepBegun(StepBegunData),

    /// `complete` was called on the saga.
    CompletionRequested(SagaData),

    /// All completion actions ran.
    SagaCompleted(SagaData),

    /// `compensate` was called on the saga.
    CompensationRequested(SagaData),

    /// All compensation actions ran.
    SagaCompensated(SagaData),

    /// A step timeout expired before the saga finished.
    SagaTimedOut(SagaData),

    /// One attempt of a completion or compensation action failed.
    ActionFailed(ActionFailedData),
}

/// Data for events that only identify the saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaData {
    pub saga_id: SagaId,
    pub recorded_at: DateTime<Utc>,
}

/// Data for StepBegun event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepBegunData {
    pub saga_id: SagaId,
    /// Compensation endpoint of the step, if any.
    pub compensation: Option<String>,
    /// Completion endpoint of the step, if any.
    pub completion: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Data for ActionFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFailedData {
    pub saga_id: SagaId,
    pub endpoint: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub error: String,
    pub recorded_at: DateTime<Utc>,
}

impl SagaEvent {
    fn saga_data(saga_id: &SagaId) -> SagaData {
        SagaData {
            saga_id: saga_id.clone(),
            recorded_at: Utc::now(),
        }
    }

    pub fn saga_created(saga_id: &SagaId) -> Self {
        SagaEvent::SagaCreated(Self::saga_data(saga_id))
    }

    pub fn step_begun(
        saga_id: &SagaId,
        compensation: Option<&str>,
        completion: Option<&str>,
    ) -> Self {
        SagaEvent::StepBegun(StepBegunData {
            saga_id: saga_id.clone(),
            compensation: compensation.map(str::to_string),
            completion: completion.map(str::to_string),
            recorded_at: Utc::now(),
        })
    }

    pub fn completion_requested(saga_id: &SagaId) -> Self {
        SagaEvent::CompletionRequested(Self::saga_data(saga_id))
    }

    pub fn saga_completed(saga_id: &SagaId) -> Self {
        SagaEvent::SagaCompleted(Self::saga_data(saga_id))
    }

    pub fn compensation_requested(saga_id: &SagaId) -> Self {
        SagaEvent::CompensationRequested(Self::saga_data(saga_id))
    }

    pub fn saga_compensated(saga_id: &SagaId) -> Self {
        SagaEvent::SagaCompensated(Self::saga_data(saga_id))
    }

    pub fn saga_timed_out(saga_id: &SagaId) -> Self {
        SagaEvent::SagaTimedOut(Self::saga_data(saga_id))
    }

    pub fn action_failed(
        saga_id: &SagaId,
        endpoint: impl Into<String>,
        attempt: u32,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::ActionFailed(ActionFailedData {
            saga_id: saga_id.clone(),
            endpoint: endpoint.into(),
            attempt,
            error: error.into(),
            recorded_at: Utc::now(),
        })
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaCreated(_) => "SagaCreated",
            SagaEvent::StepBegun(_) => "StepBegun",
            SagaEvent::CompletionRequested(_) => "CompletionRequested",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::CompensationRequested(_) => "CompensationRequested",
            SagaEvent::SagaCompensated(_) => "SagaCompensated",
            SagaEvent::SagaTimedOut(_) => "SagaTimedOut",
            SagaEvent::ActionFailed(_) => "ActionFailed",
        }
    }

    /// Returns the saga the event belongs to.
    pub fn saga_id(&self) -> &SagaId {
        match self {
            SagaEvent::SagaCreated(data)
            | SagaEvent::CompletionRequested(data)
            | SagaEvent::SagaCompleted(data)
            | SagaEvent::CompensationRequested(data)
            | SagaEvent::SagaCompensated(data)
            | SagaEvent::SagaTimedOut(data) => &data.saga_id,
            SagaEvent::StepBegun(data) => &data.saga_id,
            SagaEvent::ActionFailed(data) => &data.saga_id,
        }
    }
}
