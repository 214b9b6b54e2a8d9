//! Error types for the time limiter.

use std::time::Duration;
use svc_resilience_core::{Classify, ErrorKind};

/// Errors returned by the `TimeLimiter` service.
#[derive(Debug, thiserror::Error)]
pub enum TimeLimiterError<E> {
    /// The deadline passed before the inner service finished.
    #[error("deadline of {timeout:?} exceeded")]
    Timeout {
        /// Budget the call had when it entered the limiter.
        timeout: Duration,
    },
    /// The inner service returned an error before the deadline.
    #[error("{0}")]
    Inner(E),
}

impl<E> TimeLimiterError<E> {
    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeLimiterError::Timeout { .. })
    }

    /// Converts this error into the inner error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeLimiterError::Timeout { .. } => None,
            TimeLimiterError::Inner(e) => Some(e),
        }
    }
}

impl<E: Classify> Classify for TimeLimiterError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            TimeLimiterError::Timeout { .. } => ErrorKind::Timeout,
            TimeLimiterError::Inner(e) => e.kind(),
        }
    }
}
