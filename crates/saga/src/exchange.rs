//! The unit of work flowing through processors.

use std::collections::HashMap;

use common::SagaId;
use serde_json::Value;
use uuid::Uuid;

use crate::error::SagaError;

/// Header holding the id of the saga currently associated with an exchange.
pub const SAGA_LONG_RUNNING_ACTION: &str = "Long-Running-Action";

/// A message plus its mutable processing context.
///
/// Processors communicate failure by recording an error on the exchange
/// rather than by returning it; downstream processors and saga orchestrators
/// inspect [`Exchange::error`] to decide what to do.
#[derive(Debug, Clone)]
pub struct Exchange {
    id: String,
    body: Value,
    headers: HashMap<String, Value>,
    error: Option<SagaError>,
}

impl Exchange {
    /// Creates an exchange carrying the given body.
    pub fn new(body: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            body,
            headers: HashMap::new(),
            error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn set_body(&mut self, body: Value) {
        self.body = body;
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HashMap<String, Value> {
        &self.headers
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn remove_header(&mut self, name: &str) -> Option<Value> {
        self.headers.remove(name)
    }

    /// Returns the id of the saga currently associated with this exchange.
    pub fn saga_id(&self) -> Option<SagaId> {
        self.headers
            .get(SAGA_LONG_RUNNING_ACTION)
            .and_then(Value::as_str)
            .map(SagaId::from)
    }

    /// Associates a saga with this exchange; `None` removes the association.
    pub fn set_saga_id(&mut self, saga_id: Option<SagaId>) {
        match saga_id {
            Some(id) => {
                self.headers
                    .insert(SAGA_LONG_RUNNING_ACTION.to_string(), Value::String(id.into_string()));
            }
            None => {
                self.headers.remove(SAGA_LONG_RUNNING_ACTION);
            }
        }
    }

    pub fn error(&self) -> Option<&SagaError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Records an error, replacing any previous one.
    pub fn set_error(&mut self, error: SagaError) {
        self.error = Some(error);
    }

    pub fn take_error(&mut self) -> Option<SagaError> {
        self.error.take()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}
