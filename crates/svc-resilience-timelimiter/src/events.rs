use std::time::{Duration, Instant};
use svc_resilience_core::ResilienceEvent;

/// Events emitted by the time limiter.
#[derive(Debug, Clone)]
pub enum TimeLimiterEvent {
    /// The call finished successfully before the deadline.
    Success {
        dependency: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The call failed before the deadline.
    Error {
        dependency: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The deadline passed; the call was cancelled.
    Timeout {
        dependency: String,
        timestamp: Instant,
        timeout: Duration,
    },
}

impl ResilienceEvent for TimeLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TimeLimiterEvent::Success { .. } => "success",
            TimeLimiterEvent::Error { .. } => "error",
            TimeLimiterEvent::Timeout { .. } => "timeout",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            TimeLimiterEvent::Success { timestamp, .. }
            | TimeLimiterEvent::Error { timestamp, .. }
            | TimeLimiterEvent::Timeout { timestamp, .. } => *timestamp,
        }
    }

    fn dependency(&self) -> &str {
        match self {
            TimeLimiterEvent::Success { dependency, .. }
            | TimeLimiterEvent::Error { dependency, .. }
            | TimeLimiterEvent::Timeout { dependency, .. } => dependency,
        }
    }
}
