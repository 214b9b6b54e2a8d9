use crate::circuit::{CircuitRecord, CircuitState, DistributedCircuit};
use crate::config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
use crate::CircuitBreaker;
use std::sync::Arc;
use tower::Layer;

/// A Tower Layer that applies a distributed circuit breaker to an inner
/// service.
///
/// The layer owns the circuit. Every service it produces shares that circuit,
/// so a policy can rebuild its service stack per call without losing state:
///
/// ```rust
/// use svc_resilience_circuitbreaker::{CircuitBreakerLayer, CircuitState};
/// use tower::{Layer, service_fn};
/// use std::time::Duration;
///
/// let layer = CircuitBreakerLayer::builder()
///     .name("consultations")
///     .failure_threshold(3)
///     .recovery_timeout(Duration::from_secs(10))
///     .build();
///
/// let _first = layer.layer(service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) }));
/// let _second = layer.layer(service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) }));
/// assert_eq!(layer.current_state(), CircuitState::Closed);
/// ```
#[derive(Clone)]
pub struct CircuitBreakerLayer {
    circuit: Arc<DistributedCircuit>,
}

impl CircuitBreakerLayer {
    /// Creates a new builder for configuring a circuit breaker layer.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        crate::circuit_breaker_builder()
    }

    pub(crate) fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuit: Arc::new(DistributedCircuit::new(config)),
        }
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        self.circuit.config().name()
    }

    /// The circuit's configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        self.circuit.config()
    }

    /// Last state this process observed or wrote. Lock-free.
    pub fn current_state(&self) -> CircuitState {
        self.circuit.current_state()
    }

    /// Reads the shared circuit record, falling back to the local copy when
    /// the store is unreachable.
    pub async fn record(&self) -> CircuitRecord {
        self.circuit.record().await
    }

    /// Returns true while the breaker runs on process-local state because the
    /// store is unreachable.
    pub fn is_degraded(&self) -> bool {
        self.circuit.is_degraded()
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

impl std::fmt::Debug for CircuitBreakerLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerLayer")
            .field("name", &self.name())
            .field("state", &self.current_state())
            .finish()
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreaker<S>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(service, Arc::clone(&self.circuit))
    }
}
