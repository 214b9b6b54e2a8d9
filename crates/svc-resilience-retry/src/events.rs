use std::time::{Duration, Instant};
use svc_resilience_core::{ErrorKind, ResilienceEvent};

/// Events emitted by the retry middleware.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt failed with a retryable error; another follows after
    /// `delay`. `attempt` is the 1-based number of the attempt that failed.
    Retry {
        dependency: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
        kind: ErrorKind,
    },
    /// The operation succeeded, on the first try or after retries.
    Success {
        dependency: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        dependency: String,
        timestamp: Instant,
        attempts: usize,
        kind: ErrorKind,
    },
    /// An error was returned without retrying because its kind is not
    /// retryable.
    IgnoredError {
        dependency: String,
        timestamp: Instant,
        attempt: usize,
        kind: ErrorKind,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn dependency(&self) -> &str {
        match self {
            RetryEvent::Retry { dependency, .. }
            | RetryEvent::Success { dependency, .. }
            | RetryEvent::Exhausted { dependency, .. }
            | RetryEvent::IgnoredError { dependency, .. } => dependency,
        }
    }
}
