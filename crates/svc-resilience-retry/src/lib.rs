//! Bounded retry with exponential backoff for Tower services.
//!
//! [`Retry`] re-invokes the inner service while it fails with a retryable
//! [`ErrorKind`], sleeping between attempts according to an
//! [`ExponentialBackoff`]. It gives up on the first error whose kind is not
//! retryable and after the configured number of attempts, whichever comes
//! first.
//!
//! - A non-retryable error is returned as [`RetryError::Inner`] right away.
//! - When every attempt failed with a retryable error the last one is
//!   returned as [`RetryError::Exhausted`], which keeps the original error
//!   and therefore its kind.
//!
//! Requests must be `Clone`: each attempt gets its own copy.
//!
//! ## Example
//!
//! ```rust
//! use svc_resilience_retry::{RetryLayer, RetryError};
//! use svc_resilience_core::{ErrorKind, RetryableKinds};
//! use tower::{Layer, ServiceExt, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let layer = RetryLayer::builder()
//!     .name("notifications")
//!     .max_attempts(3)
//!     .exponential_backoff(Duration::from_millis(50))
//!     .retry_on(RetryableKinds::new([ErrorKind::Connection, ErrorKind::Unavailable]))
//!     .on_retry(|attempt, delay| println!("attempt {attempt} failed, retrying in {delay:?}"))
//!     .build();
//!
//! let service = layer.layer(service_fn(|_req: ()| async {
//!     Err::<(), _>(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
//! }));
//!
//! match service.oneshot(()).await {
//!     Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection using the `metrics` crate

mod backoff;
mod config;
mod events;
mod layer;

pub use backoff::ExponentialBackoff;
pub use config::{RetryConfig, RetryConfigBuilder};
pub use events::RetryEvent;
pub use layer::RetryLayer;

use futures::future::BoxFuture;
#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::task::{Context, Poll};
use std::time::Instant;
use svc_resilience_core::{Classify, ErrorKind};
use tower::Service;
use tracing::debug;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Returns a new builder for a `RetryLayer`.
pub fn retry_builder() -> RetryConfigBuilder {
    #[cfg(feature = "metrics")]
    {
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "retry_attempts_total",
                "Total number of retries after a failed attempt"
            );
            describe_counter!(
                "retry_exhausted_total",
                "Total number of calls that failed on every attempt"
            );
        });
    }
    RetryConfigBuilder::default()
}

/// Errors returned by the [`Retry`] service.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error. `last` is the error of
    /// the final attempt.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: E },

    /// The inner service failed with an error that is not retried.
    #[error("{0}")]
    Inner(E),
}

impl<E> RetryError<E> {
    /// Returns true if all attempts were used up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Returns the underlying error, discarding the attempt count.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Inner(e) => e,
        }
    }
}

impl<E: Classify> Classify for RetryError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            RetryError::Exhausted { last, .. } => last.kind(),
            RetryError::Inner(e) => e.kind(),
        }
    }
}

/// A Tower [`Service`] that retries failed requests.
pub struct Retry<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S> Retry<S> {
    /// Creates a new `Retry` service wrapping the given service.
    pub fn new(inner: S, config: Arc<RetryConfig>) -> Self {
        Self { inner, config }
    }
}

impl<S: Clone> Clone for Retry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req> Service<Req> for Retry<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Classify + Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = RetryError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RetryError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let mut service = self.inner.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let mut attempt = 0;

            loop {
                let error = match service.call(req.clone()).await {
                    Ok(response) => {
                        config.event_listeners.emit(&RetryEvent::Success {
                            dependency: config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                        });
                        return Ok(response);
                    }
                    Err(error) => error,
                };

                let kind = error.kind();
                if !config.retryable.contains(kind) {
                    debug!(
                        dependency = %config.name,
                        attempt = attempt + 1,
                        kind = %kind,
                        "error is not retryable"
                    );
                    config.event_listeners.emit(&RetryEvent::IgnoredError {
                        dependency: config.name.clone(),
                        timestamp: Instant::now(),
                        attempt: attempt + 1,
                        kind,
                    });
                    return Err(RetryError::Inner(error));
                }

                if attempt + 1 >= config.max_attempts {
                    debug!(
                        dependency = %config.name,
                        attempts = attempt + 1,
                        kind = %kind,
                        "retries exhausted"
                    );
                    config.event_listeners.emit(&RetryEvent::Exhausted {
                        dependency: config.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                        kind,
                    });

                    #[cfg(feature = "metrics")]
                    counter!("retry_exhausted_total", "retry" => config.name.clone())
                        .increment(1);

                    return Err(RetryError::Exhausted {
                        attempts: attempt + 1,
                        last: error,
                    });
                }

                let delay = config.backoff.next_interval(attempt);
                debug!(
                    dependency = %config.name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    kind = %kind,
                    "attempt failed, backing off"
                );
                config.event_listeners.emit(&RetryEvent::Retry {
                    dependency: config.name.clone(),
                    timestamp: Instant::now(),
                    attempt: attempt + 1,
                    delay,
                    kind,
                });

                #[cfg(feature = "metrics")]
                counter!("retry_attempts_total", "retry" => config.name.clone()).increment(1);

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}
