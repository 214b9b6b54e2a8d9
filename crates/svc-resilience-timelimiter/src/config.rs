//! Configuration for the time limiter.

use crate::events::TimeLimiterEvent;
use crate::TimeLimiterLayer;
use std::time::Duration;
use svc_resilience_core::{EventListeners, FnListener};

/// Configuration for the time limiter.
#[derive(Debug)]
pub struct TimeLimiterConfig {
    pub(crate) timeout: Duration,
    pub(crate) event_listeners: EventListeners<TimeLimiterEvent>,
    pub(crate) name: String,
}

impl TimeLimiterConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TimeLimiterConfigBuilder {
        TimeLimiterConfigBuilder::new()
    }

    /// Budget for a call that arrives without a deadline of its own.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Builder for configuring and constructing a time limiter.
pub struct TimeLimiterConfigBuilder {
    timeout: Duration,
    event_listeners: EventListeners<TimeLimiterEvent>,
    name: String,
}

impl TimeLimiterConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Sets the time budget of a call. A call whose context already carries
    /// an earlier deadline keeps that deadline.
    ///
    /// Default: 30 seconds
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the dependency name used in logs, events and metrics.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback to be invoked when a call succeeds within the
    /// deadline.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeLimiterEvent::Success { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback to be invoked when a call fails before the
    /// deadline.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeLimiterEvent::Error { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback to be invoked when a call times out.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let TimeLimiterEvent::Timeout { timeout, .. } = event {
                f(*timeout);
            }
        }));
        self
    }

    /// Adds every listener from `listeners`.
    pub fn event_listeners(mut self, listeners: &EventListeners<TimeLimiterEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn build_config(self) -> TimeLimiterConfig {
        TimeLimiterConfig {
            timeout: self.timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    /// Builds the time limiter layer.
    pub fn build(self) -> TimeLimiterLayer {
        TimeLimiterLayer::from(self.build_config())
    }
}

impl Default for TimeLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
