//! Distributed circuit breaker for Tower services.
//!
//! A circuit breaker stops calling a failing dependency for a cooldown
//! window. This breaker keeps its authoritative state in a shared key-value
//! store so every replica of a service converges on roughly the same view of
//! the dependency's health.
//!
//! ## States
//! - **Closed**: calls pass through; relevant failures are counted
//! - **Open**: calls fail fast with [`CircuitBreakerError::OpenCircuit`]
//!   until the recovery timeout has elapsed
//! - **Half-Open**: exactly one trial call is in flight cluster-wide; its
//!   outcome closes or re-opens the circuit
//!
//! ## Shared record
//!
//! The record lives under `circuit:{name}` as JSON. Open and half-open
//! records are written with a TTL of twice the recovery timeout: long enough
//! that every replica still sees the record when the window ends, short
//! enough that a crashed breaker heals itself. The only compare-and-set is
//! the move to
//! half-open: the replica that wins the swap runs the trial and everyone
//! else keeps failing fast. All other writes are last-writer-wins.
//!
//! When the store fails, the breaker keeps going on a process-local copy of
//! the record and logs a warning once. It resumes using the store as soon as
//! the store answers again. Store errors never reach the caller.
//!
//! ## Usage
//!
//! ```rust
//! use svc_resilience_circuitbreaker::{CircuitBreakerLayer, CircuitBreakerError};
//! use svc_resilience_store::InMemoryStore;
//! use tower::{Service, ServiceBuilder, ServiceExt, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let store = InMemoryStore::new();
//! let layer = CircuitBreakerLayer::builder()
//!     .name("appointments")
//!     .failure_threshold(5)
//!     .recovery_timeout(Duration::from_secs(60))
//!     .store(store)
//!     .on_state_transition(|from, to| println!("appointments: {from} -> {to}"))
//!     .build();
//!
//! let mut service = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) }));
//!
//! match service.ready().await.unwrap().call("request".to_string()).await {
//!     Ok(response) => println!("Success: {}", response),
//!     Err(CircuitBreakerError::OpenCircuit) => eprintln!("dependency unhealthy"),
//!     Err(CircuitBreakerError::Inner(e)) => eprintln!("Service error: {:?}", e),
//! }
//! # }
//! ```
//!
//! ## Failure classification
//!
//! Inner errors implement [`Classify`]. Only kinds listed in
//! `failure_kinds` (default: connection, timeout, unavailable) count toward
//! the threshold. Other errors pass through untouched; if one ends a
//! half-open trial the circuit closes, since the dependency did answer.
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection using the `metrics` crate

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
use futures::future::BoxFuture;
use std::sync::Arc;
#[cfg(feature = "metrics")]
use std::sync::Once;
use std::task::{Context, Poll};
use svc_resilience_core::Classify;
use tower::Service;

pub use circuit::{CircuitRecord, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::CircuitBreakerLayer;

use circuit::DistributedCircuit;

mod circuit;
mod config;
mod error;
mod events;
mod layer;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Returns a new builder for a `CircuitBreakerLayer`.
pub fn circuit_breaker_builder() -> CircuitBreakerConfigBuilder {
    #[cfg(feature = "metrics")]
    {
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Total number of calls through the circuit breaker"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Total number of circuit state transitions made by this process"
            );
            describe_counter!(
                "circuitbreaker_store_errors_total",
                "Total number of failed shared state store operations"
            );
            describe_gauge!(
                "circuitbreaker_state",
                "Last observed circuit state (0 closed, 1 open, 2 half-open)"
            );
        });
    }
    CircuitBreakerConfigBuilder::default()
}

/// A Tower Service that applies circuit breaker logic to an inner service.
pub struct CircuitBreaker<S> {
    inner: S,
    circuit: Arc<DistributedCircuit>,
}

impl<S> CircuitBreaker<S> {
    pub(crate) fn new(inner: S, circuit: Arc<DistributedCircuit>) -> Self {
        Self { inner, circuit }
    }

    /// Last state this process observed or wrote.
    pub fn current_state(&self) -> CircuitState {
        self.circuit.current_state()
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.current_state() == CircuitState::Open
    }

    /// Reads the shared circuit record.
    pub async fn record(&self) -> CircuitRecord {
        self.circuit.record().await
    }

    /// Opens the circuit for every replica.
    pub async fn force_open(&self) {
        self.circuit.force_open().await
    }

    /// Closes the circuit for every replica and clears the failure count.
    pub async fn reset(&self) {
        self.circuit.reset().await
    }
}

impl<S: Clone> Clone for CircuitBreaker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            circuit: Arc::clone(&self.circuit),
        }
    }
}

impl<S, Req> Service<Req> for CircuitBreaker<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Classify + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let circuit = Arc::clone(&self.circuit);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let admission = circuit.acquire().await;
            if let circuit::Admission::Rejected { .. } = admission {
                return Err(CircuitBreakerError::OpenCircuit);
            }

            let result = inner.call(req).await;
            match &result {
                Ok(_) => circuit.on_success(admission).await,
                Err(e) => circuit.on_failure(admission, e.kind()).await,
            }

            result.map_err(CircuitBreakerError::Inner)
        })
    }
}
