use std::time::{Duration, Instant};
use svc_resilience_core::ResilienceEvent;

/// Events emitted by the bulkhead.
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// All permits were taken; the call is queueing.
    CallWaiting {
        dependency: String,
        timestamp: Instant,
        max_concurrent: usize,
    },
    /// The call obtained a permit.
    CallPermitted {
        dependency: String,
        timestamp: Instant,
        concurrent_calls: usize,
        waited: Duration,
    },
    /// The call's deadline passed while it was queueing.
    CallRejected {
        dependency: String,
        timestamp: Instant,
        max_concurrent: usize,
        waited: Duration,
    },
    /// The inner call succeeded and released its permit.
    CallFinished {
        dependency: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The inner call failed and released its permit.
    CallFailed {
        dependency: String,
        timestamp: Instant,
        duration: Duration,
    },
}

impl ResilienceEvent for BulkheadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BulkheadEvent::CallWaiting { .. } => "call_waiting",
            BulkheadEvent::CallPermitted { .. } => "call_permitted",
            BulkheadEvent::CallRejected { .. } => "call_rejected",
            BulkheadEvent::CallFinished { .. } => "call_finished",
            BulkheadEvent::CallFailed { .. } => "call_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::CallWaiting { timestamp, .. }
            | BulkheadEvent::CallPermitted { timestamp, .. }
            | BulkheadEvent::CallRejected { timestamp, .. }
            | BulkheadEvent::CallFinished { timestamp, .. }
            | BulkheadEvent::CallFailed { timestamp, .. } => *timestamp,
        }
    }

    fn dependency(&self) -> &str {
        match self {
            BulkheadEvent::CallWaiting { dependency, .. }
            | BulkheadEvent::CallPermitted { dependency, .. }
            | BulkheadEvent::CallRejected { dependency, .. }
            | BulkheadEvent::CallFinished { dependency, .. }
            | BulkheadEvent::CallFailed { dependency, .. } => dependency,
        }
    }
}
