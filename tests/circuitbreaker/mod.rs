//! Circuit breaker tests.
//!
//! - thresholds.rs: opening on consecutive relevant failures
//! - half_open.rs: recovery window and the single trial call
//! - replicas.rs: several processes sharing one store
//! - degraded.rs: store outages and recovery

mod degraded;
mod thresholds;

use std::sync::Arc;
use std::time::Duration;
use svc_resilience_circuitbreaker::CircuitBreakerLayer;
use svc_resilience_core::{Classify, ErrorKind, ManualClock};
use svc_resilience_store::InMemoryStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Failure(pub ErrorKind);

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dependency failed: {}", self.0)
    }
}

impl std::error::Error for Failure {}

impl Classify for Failure {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// A store and clock shared by every replica in a test.
pub fn cluster() -> (InMemoryStore, ManualClock) {
    let clock = ManualClock::starting_at(1_700_000_000_000);
    let store = InMemoryStore::with_clock(Arc::new(clock.clone()));
    (store, clock)
}

/// One replica's breaker: threshold 3, recovery 10s.
pub fn replica(store: &InMemoryStore, clock: &ManualClock) -> CircuitBreakerLayer {
    CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(3)
        .recovery_timeout(Duration::from_secs(10))
        .store(store.clone())
        .clock(clock.clone())
        .build()
}
