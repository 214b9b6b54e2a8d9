use crate::backoff::ExponentialBackoff;
use crate::events::RetryEvent;
use crate::layer::RetryLayer;
use std::time::Duration;
use svc_resilience_core::{ErrorKind, EventListeners, FnListener, RetryableKinds};

/// Configuration for the retry middleware.
#[derive(Debug)]
pub struct RetryConfig {
    pub(crate) name: String,
    pub(crate) max_attempts: usize,
    pub(crate) backoff: ExponentialBackoff,
    pub(crate) retryable: RetryableKinds,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// The backoff schedule.
    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    /// Kinds that are retried.
    pub fn retryable(&self) -> &RetryableKinds {
        &self.retryable
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder {
    name: String,
    max_attempts: usize,
    backoff: ExponentialBackoff,
    retryable: RetryableKinds,
    event_listeners: EventListeners<RetryEvent>,
}

impl RetryConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            name: String::from("<unnamed>"),
            max_attempts: 3,
            backoff: ExponentialBackoff::default(),
            retryable: RetryableKinds::default(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets the dependency name used in logs, events and metrics.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the total number of attempts, including the first. Zero is
    /// treated as one.
    ///
    /// Default: 3
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the backoff schedule.
    ///
    /// Default: 1s initial, x2, 60s cap, 20% jitter
    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Shorthand for an exponential backoff from `initial` with default
    /// multiplier, cap and jitter.
    pub fn exponential_backoff(mut self, initial: Duration) -> Self {
        self.backoff = ExponentialBackoff::new(initial);
        self
    }

    /// Sets which error kinds are retried.
    ///
    /// Default: connection, timeout, unavailable
    pub fn retry_on(mut self, kinds: RetryableKinds) -> Self {
        self.retryable = kinds;
        self
    }

    /// Registers a callback before each retry. Receives the number of the
    /// attempt that failed and the delay before the next one.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Retry { attempt, delay, .. } = event {
                    f(*attempt, *delay);
                }
            }));
        self
    }

    /// Registers a callback on success with the number of attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Success { attempts, .. } = event {
                    f(*attempts);
                }
            }));
        self
    }

    /// Registers a callback when all attempts have failed.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, ErrorKind) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::Exhausted { attempts, kind, .. } = event {
                    f(*attempts, *kind);
                }
            }));
        self
    }

    /// Registers a callback when an error is passed through without retry.
    pub fn on_ignored_error<F>(mut self, f: F) -> Self
    where
        F: Fn(ErrorKind) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &RetryEvent| {
                if let RetryEvent::IgnoredError { kind, .. } = event {
                    f(*kind);
                }
            }));
        self
    }

    /// Adds every listener from `listeners`.
    pub fn event_listeners(mut self, listeners: &EventListeners<RetryEvent>) -> Self {
        self.event_listeners.extend(listeners);
        self
    }

    /// Builds the configuration without wrapping it in a layer.
    pub fn build_config(self) -> RetryConfig {
        RetryConfig {
            name: self.name,
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retryable: self.retryable,
            event_listeners: self.event_listeners,
        }
    }

    /// Builds the retry layer.
    pub fn build(self) -> RetryLayer {
        RetryLayer::new(self.build_config())
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
