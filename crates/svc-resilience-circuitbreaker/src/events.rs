use crate::CircuitState;
use std::time::Instant;
use svc_resilience_core::{ErrorKind, ResilienceEvent};

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// A call was admitted. `trial` is set when this caller won the half-open
    /// trial.
    CallPermitted {
        dependency: String,
        timestamp: Instant,
        state: CircuitState,
        trial: bool,
    },
    /// A call was refused without invoking the dependency.
    CallRejected {
        dependency: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// This process moved the shared circuit between states.
    StateTransition {
        dependency: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// An admitted call succeeded.
    SuccessRecorded {
        dependency: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// An admitted call failed with an error that counts against the circuit.
    FailureRecorded {
        dependency: String,
        timestamp: Instant,
        state: CircuitState,
        kind: ErrorKind,
        failure_count: u32,
    },
    /// An admitted call failed with an error that does not count against the
    /// circuit.
    ErrorIgnored {
        dependency: String,
        timestamp: Instant,
        kind: ErrorKind,
    },
    /// The shared state store stopped answering; the breaker now runs on
    /// process-local state.
    StoreUnavailable {
        dependency: String,
        timestamp: Instant,
        error: String,
    },
    /// The shared state store answered again after an outage.
    StoreRecovered {
        dependency: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::ErrorIgnored { .. } => "error_ignored",
            CircuitBreakerEvent::StoreUnavailable { .. } => "store_unavailable",
            CircuitBreakerEvent::StoreRecovered { .. } => "store_recovered",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. }
            | CircuitBreakerEvent::ErrorIgnored { timestamp, .. }
            | CircuitBreakerEvent::StoreUnavailable { timestamp, .. }
            | CircuitBreakerEvent::StoreRecovered { timestamp, .. } => *timestamp,
        }
    }

    fn dependency(&self) -> &str {
        match self {
            CircuitBreakerEvent::CallPermitted { dependency, .. }
            | CircuitBreakerEvent::CallRejected { dependency, .. }
            | CircuitBreakerEvent::StateTransition { dependency, .. }
            | CircuitBreakerEvent::SuccessRecorded { dependency, .. }
            | CircuitBreakerEvent::FailureRecorded { dependency, .. }
            | CircuitBreakerEvent::ErrorIgnored { dependency, .. }
            | CircuitBreakerEvent::StoreUnavailable { dependency, .. }
            | CircuitBreakerEvent::StoreRecovered { dependency, .. } => dependency,
        }
    }
}
