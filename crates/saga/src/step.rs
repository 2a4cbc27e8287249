//! Saga step definitions.

use std::collections::BTreeMap;
use std::time::Duration;

/// The actions attached to one orchestration point.
///
/// A step names the endpoint to call when the saga completes, the endpoint to
/// call when it is compensated, the options handed to those endpoints, and
/// per-step timeout and retry settings. Steps are immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SagaStep {
    compensation: Option<String>,
    completion: Option<String>,
    options: BTreeMap<String, String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl SagaStep {
    /// Returns a step with no actions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a builder for a step.
    pub fn builder() -> SagaStepBuilder {
        SagaStepBuilder::default()
    }

    /// Endpoint URI invoked when the saga is compensated.
    pub fn compensation(&self) -> Option<&str> {
        self.compensation.as_deref()
    }

    /// Endpoint URI invoked when the saga completes.
    pub fn completion(&self) -> Option<&str> {
        self.completion.as_deref()
    }

    /// Option name to exchange header mapping.
    ///
    /// The header values are captured when the step begins and passed as
    /// headers, under the option name, to the step's actions.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Time after which the saga is compensated if it has not finished.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Retry attempts for this step's actions, overriding the service default.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Returns true if nothing is configured on this step.
    pub fn is_empty(&self) -> bool {
        self.compensation.is_none()
            && self.completion.is_none()
            && self.options.is_empty()
            && self.timeout.is_none()
            && self.max_retries.is_none()
    }
}

/// Builder for [`SagaStep`].
#[derive(Debug, Default)]
pub struct SagaStepBuilder {
    step: SagaStep,
}

impl SagaStepBuilder {
    pub fn compensation(mut self, uri: impl Into<String>) -> Self {
        self.step.compensation = Some(uri.into());
        self
    }

    pub fn completion(mut self, uri: impl Into<String>) -> Self {
        self.step.completion = Some(uri.into());
        self
    }

    /// Adds an option whose value is read from `header` when the step begins.
    pub fn option(mut self, name: impl Into<String>, header: impl Into<String>) -> Self {
        self.step.options.insert(name.into(), header.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.step.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.step.max_retries = Some(retries);
        self
    }

    pub fn build(self) -> SagaStep {
        self.step
    }
}
