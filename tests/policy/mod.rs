//! Policy tests.
//!
//! - scenario.rs: the breaker lifecycle driven through `execute`
//! - composition.rs: how the layers interact (order, shared deadline)
//! - outcome.rs: `execute_with_outcome` reporting
//! - concurrency.rs: bulkhead limits and cancellation under load
//! - registry.rs: registries built from code and TOML

mod composition;
mod outcome;
mod scenario;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svc_resilience::{DependencyPolicyConfigBuilder, ResiliencePolicy};
use svc_resilience_core::{Classify, ErrorKind, ManualClock};
use svc_resilience_store::InMemoryStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaymentError {
    GatewayDown,
    Declined,
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::GatewayDown => write!(f, "payment gateway unreachable"),
            PaymentError::Declined => write!(f, "card declined"),
        }
    }
}

impl std::error::Error for PaymentError {}

impl Classify for PaymentError {
    fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::GatewayDown => ErrorKind::Connection,
            PaymentError::Declined => ErrorKind::Validation,
        }
    }
}

/// Shared store and clock standing in for a cluster's cache.
pub struct Cluster {
    pub store: InMemoryStore,
    pub clock: ManualClock,
}

impl Cluster {
    pub fn new() -> Self {
        let clock = ManualClock::starting_at(1_700_000_000_000);
        let store = InMemoryStore::with_clock(Arc::new(clock.clone()));
        Self { store, clock }
    }

    /// Builds one replica's policy against the shared store.
    pub fn policy(&self, config: DependencyPolicyConfigBuilder) -> ResiliencePolicy {
        ResiliencePolicy::builder(config.build().unwrap())
            .store(self.store.clone())
            .clock(self.clock.clone())
            .build()
            .unwrap()
    }
}

/// Counts invocations of an operation.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn fast_retries(builder: DependencyPolicyConfigBuilder) -> DependencyPolicyConfigBuilder {
    builder
        .base_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(100))
        .per_call_timeout(Duration::from_secs(5))
}
