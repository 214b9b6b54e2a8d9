//! Deadline enforcement for Tower services.
//!
//! [`TimeLimiter`] runs the inner service under a deadline. The deadline is
//! taken from the [`CallContext`] when the caller set one, otherwise it is
//! `now + timeout`. When a context carries a deadline and the limiter has a
//! timeout, the earlier of the two wins.
//!
//! ## Cancellation
//!
//! The inner service receives a context whose cancellation token is a child
//! of the caller's. When the deadline passes, that token is cancelled and the
//! in-flight future is dropped. Work the operation handed to other tasks must
//! watch [`CallContext::cancellation`] and stop; nothing is preempted. The
//! token is also cancelled when the caller drops the call before it
//! finishes.
//!
//! An inner result that is ready on the same poll as the deadline is
//! returned as is: the inner future is always polled before the timer, so an
//! operation that failed just before the deadline keeps its own error.
//!
//! ## Example
//!
//! ```rust
//! use svc_resilience_core::{deadline_after, CallContext};
//! use svc_resilience_timelimiter::{TimeLimiterLayer, TimeLimiterError};
//! use tower::{Layer, ServiceExt, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let layer = TimeLimiterLayer::builder()
//!     .name("messaging")
//!     .timeout(Duration::from_secs(5))
//!     .build();
//!
//! let service = layer.layer(service_fn(|ctx: CallContext| async move {
//!     tokio::select! {
//!         _ = ctx.cancellation().cancelled() => Err(std::io::Error::other("abandoned")),
//!         _ = tokio::time::sleep(Duration::from_secs(1)) => Ok("delivered"),
//!     }
//! }));
//!
//! match service.oneshot(CallContext::new("messaging")).await {
//!     Ok(r) => println!("{r}"),
//!     Err(TimeLimiterError::Timeout { timeout }) => eprintln!("gave up after {timeout:?}"),
//!     Err(TimeLimiterError::Inner(e)) => eprintln!("failed: {e}"),
//! }
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection using the `metrics` crate

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use svc_resilience_core::{deadline_after, CallContext};
use tower::Service;
use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

pub use config::{TimeLimiterConfig, TimeLimiterConfigBuilder};
pub use error::TimeLimiterError;
pub use events::TimeLimiterEvent;
pub use layer::TimeLimiterLayer;

mod config;
mod error;
mod events;
mod layer;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Returns a new builder for a `TimeLimiterLayer`.
pub fn time_limiter_builder() -> TimeLimiterConfigBuilder {
    #[cfg(feature = "metrics")]
    {
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "timelimiter_calls_total",
                "Total number of time limiter calls (success, error, or timeout)"
            );
            describe_histogram!(
                "timelimiter_call_duration_seconds",
                "Duration of calls that finished before the deadline"
            );
        });
    }
    TimeLimiterConfigBuilder::default()
}

/// A Tower service that applies a deadline to an inner service.
#[derive(Clone)]
pub struct TimeLimiter<S> {
    inner: S,
    config: Arc<TimeLimiterConfig>,
}

impl<S> TimeLimiter<S> {
    pub(crate) fn new(inner: S, config: Arc<TimeLimiterConfig>) -> Self {
        Self { inner, config }
    }
}

impl<S> Service<CallContext> for TimeLimiter<S>
where
    S: Service<CallContext> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = TimeLimiterError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(TimeLimiterError::Inner)
    }

    fn call(&mut self, ctx: CallContext) -> Self::Future {
        let mut inner = self.inner.clone();
        let config = Arc::clone(&self.config);

        let now = tokio::time::Instant::now();
        let own_deadline = deadline_after(now, config.timeout);
        let deadline = ctx
            .deadline()
            .map_or(own_deadline, |d| d.min(own_deadline));
        let budget = deadline.saturating_duration_since(now);

        let token = ctx.cancellation().child_token();
        let ctx = ctx.with_deadline(deadline).with_cancellation(token.clone());

        Box::pin(async move {
            // Cancels the token if this future is dropped before finishing.
            let guard = token.clone().drop_guard();
            let start = tokio::time::Instant::now();

            match tokio::time::timeout_at(deadline, inner.call(ctx)).await {
                Ok(result) => {
                    guard.disarm();
                    let duration = start.elapsed();

                    match result {
                        Ok(response) => {
                            config.event_listeners.emit(&TimeLimiterEvent::Success {
                                dependency: config.name.clone(),
                                timestamp: Instant::now(),
                                duration,
                            });

                            #[cfg(feature = "metrics")]
                            {
                                counter!("timelimiter_calls_total", "timelimiter" => config.name.clone(), "result" => "success").increment(1);
                                histogram!("timelimiter_call_duration_seconds", "timelimiter" => config.name.clone())
                                    .record(duration.as_secs_f64());
                            }

                            debug!(
                                dependency = %config.name,
                                duration_ms = duration.as_millis() as u64,
                                "call succeeded within deadline"
                            );
                            Ok(response)
                        }
                        Err(err) => {
                            config.event_listeners.emit(&TimeLimiterEvent::Error {
                                dependency: config.name.clone(),
                                timestamp: Instant::now(),
                                duration,
                            });

                            #[cfg(feature = "metrics")]
                            {
                                counter!("timelimiter_calls_total", "timelimiter" => config.name.clone(), "result" => "error").increment(1);
                                histogram!("timelimiter_call_duration_seconds", "timelimiter" => config.name.clone())
                                    .record(duration.as_secs_f64());
                            }

                            debug!(
                                dependency = %config.name,
                                duration_ms = duration.as_millis() as u64,
                                "call failed within deadline"
                            );
                            Err(TimeLimiterError::Inner(err))
                        }
                    }
                }
                Err(_elapsed) => {
                    token.cancel();
                    drop(guard);

                    config.event_listeners.emit(&TimeLimiterEvent::Timeout {
                        dependency: config.name.clone(),
                        timestamp: Instant::now(),
                        timeout: budget,
                    });

                    #[cfg(feature = "metrics")]
                    counter!("timelimiter_calls_total", "timelimiter" => config.name.clone(), "result" => "timeout").increment(1);

                    warn!(
                        dependency = %config.name,
                        timeout_ms = budget.as_millis() as u64,
                        "call timed out, cancelling"
                    );
                    Err(TimeLimiterError::Timeout { timeout: budget })
                }
            }
        })
    }
}
