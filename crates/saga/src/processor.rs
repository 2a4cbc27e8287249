//! Units of work that operate on exchanges.

use std::sync::Arc;

use async_trait::async_trait;

use crate::exchange::Exchange;

/// A unit of work applied to an exchange.
///
/// Implementations report failure by calling [`Exchange::set_error`]. The
/// returned future resolves exactly once, after the work is finished.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, exchange: &mut Exchange);
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    async fn process(&self, exchange: &mut Exchange) {
        (**self).process(exchange).await
    }
}

/// Adapts a synchronous closure into a [`Processor`].
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&mut Exchange) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(&mut Exchange) + Send + Sync,
{
    async fn process(&self, exchange: &mut Exchange) {
        (self.f)(exchange)
    }
}

/// Runs processors in order, stopping at the first one that records an error.
#[derive(Clone, Default)]
pub struct Pipeline {
    processors: Vec<Arc<dyn Processor>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a processor to the pipeline.
    pub fn then(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    /// Appends an already shared processor to the pipeline.
    pub fn then_shared(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

#[async_trait]
impl Processor for Pipeline {
    async fn process(&self, exchange: &mut Exchange) {
        for processor in &self.processors {
            if exchange.has_error() {
                tracing::debug!(exchange_id = %exchange.id(), "pipeline stopped on error");
                return;
            }
            processor.process(exchange).await;
        }
    }
}
