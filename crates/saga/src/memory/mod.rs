//! In-memory saga service.
//!
//! Keeps sagas in process memory and runs step actions through processors
//! registered in an [`EndpointRegistry`]. Suitable for tests and for
//! single-process deployments where sagas need not survive a restart.

pub mod coordinator;
pub mod endpoints;
pub mod service;

pub use coordinator::InMemorySagaCoordinator;
pub use endpoints::EndpointRegistry;
pub use service::InMemorySagaService;
