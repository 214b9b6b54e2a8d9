use crate::events::CircuitBreakerEvent;
use crate::layer::CircuitBreakerLayer;
use crate::CircuitState;
use std::sync::Arc;
use std::time::Duration;
use svc_resilience_core::{
    Clock, ErrorKind, EventListeners, FnListener, RetryableKinds, SharedClock, SystemClock,
};
use svc_resilience_store::{InMemoryStore, SharedStateStore, SharedStore};

/// Configuration for a distributed circuit breaker.
pub struct CircuitBreakerConfig {
    pub(crate) name: String,
    pub(crate) failure_threshold: u32,
    pub(crate) recovery_timeout: Duration,
    pub(crate) failure_kinds: RetryableKinds,
    pub(crate) store: SharedStore,
    pub(crate) clock: SharedClock,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Name of the protected dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consecutive relevant failures that open the circuit.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// How long the circuit stays open before a trial call is allowed.
    pub fn recovery_timeout(&self) -> Duration {
        self.recovery_timeout
    }

    /// Error kinds that count against the circuit.
    pub fn failure_kinds(&self) -> &RetryableKinds {
        &self.failure_kinds
    }
}

impl std::fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("name", &self.name)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("failure_kinds", &self.failure_kinds)
            .field("event_listeners", &self.event_listeners)
            .finish_non_exhaustive()
    }
}

/// Builder for configuring and constructing a circuit breaker.
pub struct CircuitBreakerConfigBuilder {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    failure_kinds: RetryableKinds,
    store: Option<SharedStore>,
    clock: Option<SharedClock>,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            failure_kinds: RetryableKinds::default(),
            store: None,
            clock: None,
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the dependency name. It keys the shared record (`circuit:{name}`)
    /// and labels logs, events and metrics.
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Sets the number of relevant failures that opens the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets how long the circuit stays open before one trial call is let
    /// through.
    ///
    /// Default: 60 seconds
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Sets the error kinds that count against the circuit. Errors of any
    /// other kind pass through without touching the failure count.
    ///
    /// Default: connection, timeout, unavailable
    pub fn failure_kinds(mut self, kinds: RetryableKinds) -> Self {
        self.failure_kinds = kinds;
        self
    }

    /// Sets the store holding the shared circuit record.
    ///
    /// Default: a private [`InMemoryStore`], which makes the breaker
    /// process-local.
    pub fn store<S: SharedStateStore>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Sets a store that is already shared.
    pub fn shared_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the wall clock used for transition timestamps.
    ///
    /// Default: [`SystemClock`]
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Registers a callback when this process moves the circuit between
    /// states.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback when a call is admitted. The flag is true for a
    /// half-open trial.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, bool) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallPermitted { state, trial, .. } = event {
                    f(*state, *trial);
                }
            }));
        self
    }

    /// Registers a callback when a call is rejected without reaching the
    /// dependency.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback when an admitted call succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SuccessRecorded { state, .. } = event {
                    f(*state);
                }
            }));
        self
    }

    /// Registers a callback when an admitted call fails with a relevant
    /// error. Receives the error kind and the failure count after recording.
    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(ErrorKind, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::FailureRecorded {
                    kind,
                    failure_count,
                    ..
                } = event
                {
                    f(*kind, *failure_count);
                }
            }));
        self
    }

    /// Registers a callback when the shared store becomes unreachable.
    pub fn on_store_unavailable<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StoreUnavailable { error, .. } = event {
                    f(error);
                }
            }));
        self
    }

    /// Adds every listener from `listeners`.
    pub fn event_listeners(mut self, listeners: &EventListeners<CircuitBreakerEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn build_config(self) -> CircuitBreakerConfig {
        let clock: SharedClock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::with_clock(Arc::clone(&clock))));

        CircuitBreakerConfig {
            name: self.name,
            failure_threshold: self.failure_threshold.max(1),
            recovery_timeout: self.recovery_timeout,
            failure_kinds: self.failure_kinds,
            store,
            clock,
            event_listeners: self.event_listeners,
        }
    }

    /// Builds the circuit breaker layer.
    pub fn build(self) -> CircuitBreakerLayer {
        CircuitBreakerLayer::new(self.build_config())
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
