//! Saga orchestration engine.
//!
//! This crate wraps units of work in saga scopes. A [`SagaProcessor`]
//! decides, according to its [`Propagation`] policy, whether the wrapped
//! processor joins the saga already associated with an exchange, starts a
//! new one, suspends it, or rejects the exchange. Sagas the orchestrator
//! starts are completed when the work succeeds and compensated when it
//! fails, unless the completion mode is manual.
//!
//! Sagas themselves are managed by a [`SagaService`]; an in-memory service
//! is provided in [`memory`].

pub mod actions;
pub mod builder;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod exchange;
pub mod memory;
pub mod orchestrator;
pub mod processor;
pub mod propagation;
pub mod service;
pub mod state;
pub mod step;

pub use actions::{SagaAction, SagaActionProcessor};
pub use builder::SagaProcessorBuilder;
pub use common::SagaId;
pub use config::SagaConfig;
pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError};
pub use events::SagaEvent;
pub use exchange::{Exchange, SAGA_LONG_RUNNING_ACTION};
pub use memory::{EndpointRegistry, InMemorySagaCoordinator, InMemorySagaService};
pub use orchestrator::SagaProcessor;
pub use processor::{FnProcessor, Pipeline, Processor};
pub use propagation::{CompletionMode, Propagation};
pub use service::SagaService;
pub use state::SagaState;
pub use step::{SagaStep, SagaStepBuilder};
