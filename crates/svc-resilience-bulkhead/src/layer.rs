//! Tower layer for the bulkhead.

use crate::config::BulkheadConfig;
use crate::Bulkhead;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower::layer::Layer;

/// A Tower layer that limits concurrent calls to a dependency.
///
/// The semaphore lives in the layer: services produced by the same layer, or
/// by its clones, draw from one pool of permits.
#[derive(Debug, Clone)]
pub struct BulkheadLayer {
    semaphore: Arc<Semaphore>,
    config: Arc<BulkheadConfig>,
}

impl BulkheadLayer {
    /// Creates a new builder for configuring a bulkhead layer.
    pub fn builder() -> crate::BulkheadConfigBuilder {
        crate::bulkhead_builder()
    }

    pub(crate) fn new(config: BulkheadConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config: Arc::new(config),
        }
    }

    /// The layer's configuration.
    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }
}

impl<S> Layer<S> for BulkheadLayer {
    type Service = Bulkhead<S>;

    fn layer(&self, service: S) -> Self::Service {
        Bulkhead::new(
            service,
            Arc::clone(&self.semaphore),
            Arc::clone(&self.config),
        )
    }
}
