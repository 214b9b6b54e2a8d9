//! Configuration for the bulkhead.

use crate::events::BulkheadEvent;
use crate::BulkheadLayer;
use std::time::Duration;
use svc_resilience_core::{EventListeners, FnListener};

/// Configuration for the bulkhead.
#[derive(Debug)]
pub struct BulkheadConfig {
    pub(crate) max_concurrent: usize,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    /// Maximum number of calls in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Dependency name used in logs, events and metrics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for the bulkhead configuration.
pub struct BulkheadConfigBuilder {
    max_concurrent: usize,
    name: String,
    event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            max_concurrent: 25,
            name: String::from("<unnamed>"),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the maximum number of concurrent calls. Values below 1 are
    /// raised to 1.
    ///
    /// Default: 25
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Sets the dependency name.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked with the number of calls in flight when
    /// a call is admitted.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallPermitted {
                concurrent_calls, ..
            } = event
            {
                f(*concurrent_calls);
            }
        }));
        self
    }

    /// Registers a callback invoked when a call has to queue for a permit.
    pub fn on_call_waiting<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, BulkheadEvent::CallWaiting { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked with the time spent queueing when a call
    /// misses its deadline without getting a permit.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallRejected { waited, .. } = event {
                f(*waited);
            }
        }));
        self
    }

    /// Registers a callback invoked when an admitted call succeeds.
    pub fn on_call_finished<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallFinished { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback invoked when an admitted call fails.
    pub fn on_call_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let BulkheadEvent::CallFailed { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Adds every listener from `listeners`.
    pub fn event_listeners(mut self, listeners: &EventListeners<BulkheadEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn build_config(self) -> BulkheadConfig {
        BulkheadConfig {
            max_concurrent: self.max_concurrent,
            name: self.name,
            event_listeners: self.event_listeners,
        }
    }

    /// Builds the bulkhead layer. The layer owns the semaphore, so every
    /// service it produces shares the same permits.
    pub fn build(self) -> BulkheadLayer {
        BulkheadLayer::new(self.build_config())
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
