//! Concurrency isolation for Tower services.
//!
//! A bulkhead caps how many calls to one dependency may be in flight in this
//! process. It is not shared across replicas: each process protects its own
//! worker capacity.
//!
//! A saturated bulkhead queues the caller instead of failing fast. The wait
//! has no bound of its own; it ends at the deadline carried by the
//! [`CallContext`], and a call that reaches its deadline while queueing fails
//! with [`BulkheadError::SaturatedTimeout`]. A context without a deadline
//! waits until a permit frees up.
//!
//! The permit is held by the call's future, so it is released however the
//! call ends, including when the caller drops it.
//!
//! ```rust
//! use svc_resilience_bulkhead::BulkheadLayer;
//! use svc_resilience_core::CallContext;
//! use tower::{Layer, ServiceExt, service_fn};
//!
//! # async fn example() {
//! let layer = BulkheadLayer::builder()
//!     .name("auth")
//!     .max_concurrent(50)
//!     .on_call_waiting(|| println!("auth bulkhead saturated"))
//!     .build();
//!
//! let service = layer.layer(service_fn(|_ctx: CallContext| async {
//!     Ok::<_, std::io::Error>("token")
//! }));
//! let token = service.oneshot(CallContext::new("auth")).await;
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection using the `metrics` crate

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use svc_resilience_core::CallContext;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tower::Service;
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

pub use config::{BulkheadConfig, BulkheadConfigBuilder};
pub use error::BulkheadError;
pub use events::BulkheadEvent;
pub use layer::BulkheadLayer;

mod config;
mod error;
mod events;
mod layer;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Returns a new builder for a `BulkheadLayer`.
pub fn bulkhead_builder() -> BulkheadConfigBuilder {
    #[cfg(feature = "metrics")]
    {
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "bulkhead_calls_permitted_total",
                "Total number of calls admitted by the bulkhead"
            );
            describe_counter!(
                "bulkhead_calls_waited_total",
                "Total number of calls that queued for a permit"
            );
            describe_counter!(
                "bulkhead_calls_rejected_total",
                "Total number of calls that reached their deadline while queueing"
            );
            describe_gauge!(
                "bulkhead_concurrent_calls",
                "Number of calls currently holding a permit"
            );
        });
    }
    BulkheadConfigBuilder::default()
}

/// A Tower service that limits concurrent calls to the inner service.
pub struct Bulkhead<S> {
    inner: S,
    semaphore: Arc<Semaphore>,
    config: Arc<BulkheadConfig>,
}

impl<S: Clone> Clone for Bulkhead<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            semaphore: Arc::clone(&self.semaphore),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> Bulkhead<S> {
    pub(crate) fn new(inner: S, semaphore: Arc<Semaphore>, config: Arc<BulkheadConfig>) -> Self {
        Self {
            inner,
            semaphore,
            config,
        }
    }

    /// Calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        in_flight(&self.semaphore, &self.config)
    }
}

fn in_flight(semaphore: &Semaphore, config: &BulkheadConfig) -> usize {
    config
        .max_concurrent
        .saturating_sub(semaphore.available_permits())
}

impl<S> Service<CallContext> for Bulkhead<S>
where
    S: Service<CallContext> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = BulkheadError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(BulkheadError::Inner)
    }

    fn call(&mut self, ctx: CallContext) -> Self::Future {
        let semaphore = Arc::clone(&self.semaphore);
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let queued_at = tokio::time::Instant::now();
            let permit = acquire(&semaphore, &config, &ctx).await?;
            let waited = queued_at.elapsed();

            let concurrent_calls = in_flight(&semaphore, &config);
            config.event_listeners.emit(&BulkheadEvent::CallPermitted {
                dependency: config.name.clone(),
                timestamp: Instant::now(),
                concurrent_calls,
                waited,
            });

            #[cfg(feature = "metrics")]
            {
                counter!("bulkhead_calls_permitted_total", "bulkhead" => config.name.clone())
                    .increment(1);
                gauge!("bulkhead_concurrent_calls", "bulkhead" => config.name.clone())
                    .set(concurrent_calls as f64);
            }

            let started = tokio::time::Instant::now();
            let result = inner.call(ctx).await;
            let duration = started.elapsed();
            drop(permit);

            let event = match &result {
                Ok(_) => BulkheadEvent::CallFinished {
                    dependency: config.name.clone(),
                    timestamp: Instant::now(),
                    duration,
                },
                Err(_) => BulkheadEvent::CallFailed {
                    dependency: config.name.clone(),
                    timestamp: Instant::now(),
                    duration,
                },
            };
            config.event_listeners.emit(&event);

            #[cfg(feature = "metrics")]
            gauge!("bulkhead_concurrent_calls", "bulkhead" => config.name.clone())
                .set(in_flight(&semaphore, &config) as f64);

            result.map_err(BulkheadError::Inner)
        })
    }
}

/// Takes a permit, queueing until the context's deadline when none is free.
async fn acquire<E>(
    semaphore: &Arc<Semaphore>,
    config: &BulkheadConfig,
    ctx: &CallContext,
) -> Result<OwnedSemaphorePermit, BulkheadError<E>> {
    match Arc::clone(semaphore).try_acquire_owned() {
        Ok(permit) => return Ok(permit),
        Err(TryAcquireError::Closed) => return Err(BulkheadError::Closed),
        Err(TryAcquireError::NoPermits) => {}
    }

    config.event_listeners.emit(&BulkheadEvent::CallWaiting {
        dependency: config.name.clone(),
        timestamp: Instant::now(),
        max_concurrent: config.max_concurrent,
    });

    #[cfg(feature = "metrics")]
    counter!("bulkhead_calls_waited_total", "bulkhead" => config.name.clone()).increment(1);

    debug!(
        dependency = %config.name,
        max_concurrent = config.max_concurrent,
        "bulkhead saturated, queueing"
    );

    let queued_at = tokio::time::Instant::now();
    let acquired = match ctx.deadline() {
        Some(deadline) => {
            match tokio::time::timeout_at(deadline, Arc::clone(semaphore).acquire_owned()).await {
                Ok(acquired) => acquired,
                Err(_elapsed) => {
                    let waited = queued_at.elapsed();
                    config.event_listeners.emit(&BulkheadEvent::CallRejected {
                        dependency: config.name.clone(),
                        timestamp: Instant::now(),
                        max_concurrent: config.max_concurrent,
                        waited,
                    });

                    #[cfg(feature = "metrics")]
                    counter!("bulkhead_calls_rejected_total", "bulkhead" => config.name.clone())
                        .increment(1);

                    warn!(
                        dependency = %config.name,
                        waited_ms = waited.as_millis() as u64,
                        "deadline reached while waiting for a bulkhead permit"
                    );
                    return Err(BulkheadError::SaturatedTimeout {
                        max_concurrent: config.max_concurrent,
                        waited,
                    });
                }
            }
        }
        None => Arc::clone(semaphore).acquire_owned().await,
    };

    acquired.map_err(|_| BulkheadError::Closed)
}
