//! Tower layer for the time limiter.

use crate::config::TimeLimiterConfig;
use crate::TimeLimiter;
use std::sync::Arc;
use tower::layer::Layer;

/// A Tower layer that applies a deadline to a service.
///
/// ```
/// use svc_resilience_timelimiter::TimeLimiterLayer;
/// use std::time::Duration;
///
/// let layer = TimeLimiterLayer::builder()
///     .name("appointments")
///     .timeout(Duration::from_secs(30))
///     .build();
/// assert_eq!(layer.config().timeout(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct TimeLimiterLayer {
    config: Arc<TimeLimiterConfig>,
}

impl TimeLimiterLayer {
    /// Creates a new builder for configuring a time limiter layer.
    pub fn builder() -> crate::TimeLimiterConfigBuilder {
        crate::time_limiter_builder()
    }

    /// The layer's configuration.
    pub fn config(&self) -> &TimeLimiterConfig {
        &self.config
    }
}

impl From<TimeLimiterConfig> for TimeLimiterLayer {
    fn from(config: TimeLimiterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for TimeLimiterLayer {
    type Service = TimeLimiter<S>;

    fn layer(&self, service: S) -> Self::Service {
        TimeLimiter::new(service, Arc::clone(&self.config))
    }
}
