//! Endpoint registry resolving step action URIs to processors.

use std::collections::HashMap;
use std::sync::Arc;

use crate::processor::Processor;

/// Maps endpoint URIs to the processors that implement them.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    endpoints: HashMap<String, Arc<dyn Processor>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor under the given URI, replacing any previous one.
    pub fn register(&mut self, uri: impl Into<String>, processor: impl Processor + 'static) {
        self.endpoints.insert(uri.into(), Arc::new(processor));
    }

    /// Builder-style variant of [`EndpointRegistry::register`].
    pub fn with(mut self, uri: impl Into<String>, processor: impl Processor + 'static) -> Self {
        self.register(uri, processor);
        self
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Processor>> {
        self.endpoints.get(uri).cloned()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.endpoints.contains_key(uri)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut uris: Vec<&String> = self.endpoints.keys().collect();
        uris.sort();
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &uris)
            .finish()
    }
}
