//! In-memory saga service and its test hooks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::SagaId;
use tokio::sync::RwLock;

use crate::config::SagaConfig;
use crate::coordinator::SagaCoordinator;
use crate::error::SagaError;
use crate::events::SagaEvent;
use crate::memory::coordinator::InMemorySagaCoordinator;
use crate::memory::endpoints::EndpointRegistry;
use crate::service::SagaService;

/// Fault injection switches, one per service or coordinator operation.
#[derive(Debug, Default)]
pub(crate) struct Faults {
    pub new_saga: AtomicBool,
    pub get_saga: AtomicBool,
    pub begin_step: AtomicBool,
    pub complete: AtomicBool,
    pub compensate: AtomicBool,
}

impl Faults {
    pub fn check(flag: &AtomicBool, operation: &str) -> Result<(), SagaError> {
        if flag.load(Ordering::SeqCst) {
            Err(SagaError::Service(format!("{operation} failed")))
        } else {
            Ok(())
        }
    }
}

/// State shared between the service and every coordinator it creates.
#[derive(Debug)]
pub(crate) struct Shared {
    pub config: SagaConfig,
    pub endpoints: EndpointRegistry,
    pub faults: Faults,
    journal: RwLock<Vec<SagaEvent>>,
}

impl Shared {
    pub async fn record(&self, event: SagaEvent) {
        self.journal.write().await.push(event);
    }
}

/// Saga service keeping all sagas in memory.
///
/// Cloning the service is cheap; clones share the same sagas and journal.
/// Finished sagas stay queryable, together with their journal entries, until
/// [`InMemorySagaService::prune_finished`] drops them.
#[derive(Debug, Clone)]
pub struct InMemorySagaService {
    sagas: Arc<RwLock<HashMap<SagaId, InMemorySagaCoordinator>>>,
    shared: Arc<Shared>,
}

impl InMemorySagaService {
    /// Creates a service with default retry settings and no endpoints.
    pub fn new() -> Self {
        Self::with_config(SagaConfig::default(), EndpointRegistry::new())
    }

    /// Creates a service running step actions through the given endpoints.
    pub fn with_config(config: SagaConfig, endpoints: EndpointRegistry) -> Self {
        Self {
            sagas: Arc::new(RwLock::new(HashMap::new())),
            shared: Arc::new(Shared {
                config,
                endpoints,
                faults: Faults::default(),
                journal: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.shared.config
    }

    /// Configures `new_saga` to fail.
    pub fn set_fail_on_new_saga(&self, fail: bool) {
        self.shared.faults.new_saga.store(fail, Ordering::SeqCst);
    }

    /// Configures `get_saga` to fail.
    pub fn set_fail_on_get_saga(&self, fail: bool) {
        self.shared.faults.get_saga.store(fail, Ordering::SeqCst);
    }

    /// Configures `begin_step` to fail on every coordinator.
    pub fn set_fail_on_begin_step(&self, fail: bool) {
        self.shared.faults.begin_step.store(fail, Ordering::SeqCst);
    }

    /// Configures `complete` to fail on every coordinator.
    pub fn set_fail_on_complete(&self, fail: bool) {
        self.shared.faults.complete.store(fail, Ordering::SeqCst);
    }

    /// Configures `compensate` to fail on every coordinator.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        self.shared.faults.compensate.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of sagas created so far.
    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }

    /// Returns the coordinator for the given saga, if known.
    pub async fn coordinator(&self, id: &SagaId) -> Option<InMemorySagaCoordinator> {
        self.sagas.read().await.get(id).cloned()
    }

    /// Drops completed and compensated sagas along with their journal entries.
    ///
    /// Returns the number of sagas removed.
    pub async fn prune_finished(&self) -> usize {
        let mut sagas = self.sagas.write().await;
        let mut finished = Vec::new();
        for (id, coordinator) in sagas.iter() {
            if coordinator.state().await.is_terminal() {
                finished.push(id.clone());
            }
        }
        for id in &finished {
            sagas.remove(id);
        }
        drop(sagas);

        if !finished.is_empty() {
            self.shared
                .journal
                .write()
                .await
                .retain(|e| !finished.contains(e.saga_id()));
            tracing::debug!(count = finished.len(), "pruned finished sagas");
        }
        finished.len()
    }

    /// Returns every recorded event, oldest first.
    pub async fn journal(&self) -> Vec<SagaEvent> {
        self.shared.journal.read().await.clone()
    }

    /// Returns the event types recorded for one saga, oldest first.
    pub async fn event_types(&self, id: &SagaId) -> Vec<&'static str> {
        self.shared
            .journal
            .read()
            .await
            .iter()
            .filter(|e| e.saga_id() == id)
            .map(SagaEvent::event_type)
            .collect()
    }

    /// Counts events of one type recorded for one saga.
    pub async fn count_events(&self, id: &SagaId, event_type: &str) -> usize {
        self.shared
            .journal
            .read()
            .await
            .iter()
            .filter(|e| e.saga_id() == id && e.event_type() == event_type)
            .count()
    }
}

impl Default for InMemorySagaService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SagaService for InMemorySagaService {
    #[tracing::instrument(skip(self))]
    async fn new_saga(&self) -> Result<Arc<dyn SagaCoordinator>, SagaError> {
        Faults::check(&self.shared.faults.new_saga, "new_saga")?;

        let coordinator = InMemorySagaCoordinator::new(SagaId::new(), Arc::clone(&self.shared));
        let id = coordinator.id();
        self.sagas
            .write()
            .await
            .insert(id.clone(), coordinator.clone());
        self.shared.record(SagaEvent::saga_created(&id)).await;

        metrics::counter!("saga_created_total").increment(1);
        tracing::debug!(saga_id = %id, "saga created");
        Ok(Arc::new(coordinator))
    }

    #[tracing::instrument(skip(self, id), fields(saga_id = %id))]
    async fn get_saga(&self, id: &SagaId) -> Result<Option<Arc<dyn SagaCoordinator>>, SagaError> {
        Faults::check(&self.shared.faults.get_saga, "get_saga")?;

        Ok(self
            .sagas
            .read()
            .await
            .get(id)
            .cloned()
            .map(|c| Arc::new(c) as Arc<dyn SagaCoordinator>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prune_finished_keeps_active_sagas() {
        let service = InMemorySagaService::new();
        let done = service.new_saga().await.unwrap();
        let open = service.new_saga().await.unwrap();
        done.complete().await.unwrap();

        assert_eq!(service.prune_finished().await, 1);
        assert_eq!(service.saga_count().await, 1);
        assert!(service.coordinator(&done.id()).await.is_none());
        assert!(service.event_types(&done.id()).await.is_empty());
        assert_eq!(service.event_types(&open.id()).await, vec!["SagaCreated"]);

        assert_eq!(service.prune_finished().await, 0);
    }

    #[tokio::test]
    async fn test_new_and_get_saga() {
        let service = InMemorySagaService::new();
        let coordinator = service.new_saga().await.unwrap();
        let id = coordinator.id();

        assert_eq!(service.saga_count().await, 1);
        let found = service.get_saga(&id).await.unwrap().unwrap();
        assert_eq!(found.id(), id);
        assert_eq!(service.event_types(&id).await, vec!["SagaCreated"]);
    }

    #[tokio::test]
    async fn test_get_unknown_saga() {
        let service = InMemorySagaService::new();
        let found = service.get_saga(&SagaId::from("missing")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_fail_on_new_saga() {
        let service = InMemorySagaService::new();
        service.set_fail_on_new_saga(true);

        let result = service.new_saga().await;
        assert!(matches!(result, Err(SagaError::Service(_))));
        assert_eq!(service.saga_count().await, 0);
        assert!(service.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_get_saga() {
        let service = InMemorySagaService::new();
        let id = service.new_saga().await.unwrap().id();
        service.set_fail_on_get_saga(true);

        assert!(service.get_saga(&id).await.is_err());

        service.set_fail_on_get_saga(false);
        assert!(service.get_saga(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clones_share_sagas() {
        let service = InMemorySagaService::new();
        let clone = service.clone();
        let id = service.new_saga().await.unwrap().id();

        assert!(clone.coordinator(&id).await.is_some());
        assert_eq!(clone.count_events(&id, "SagaCreated").await, 1);
    }
}
