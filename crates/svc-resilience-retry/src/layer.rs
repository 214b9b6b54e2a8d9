use crate::{Retry, RetryConfig, RetryConfigBuilder};
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that applies retry logic to a service.
///
/// ```
/// use svc_resilience_retry::{ExponentialBackoff, RetryLayer};
/// use tower::ServiceBuilder;
/// use std::time::Duration;
///
/// # async fn example() {
/// let retry_layer = RetryLayer::builder()
///     .name("messaging")
///     .max_attempts(4)
///     .backoff(
///         ExponentialBackoff::new(Duration::from_millis(100))
///             .max_interval(Duration::from_secs(2)),
///     )
///     .build();
///
/// let service = ServiceBuilder::new()
///     .layer(retry_layer)
///     .service(tower::service_fn(|req: String| async move {
///         Ok::<_, std::io::Error>(req)
///     }));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    /// Creates a new builder.
    pub fn builder() -> RetryConfigBuilder {
        crate::retry_builder()
    }

    pub(crate) fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The layer's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = Retry<S>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, Arc::clone(&self.config))
    }
}
