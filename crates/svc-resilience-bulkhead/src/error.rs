//! Error types for the bulkhead.

use std::time::Duration;
use svc_resilience_core::{Classify, ErrorKind};

/// Errors returned by the `Bulkhead` service.
#[derive(Debug, thiserror::Error)]
pub enum BulkheadError<E> {
    /// No permit became free before the call's deadline.
    #[error("bulkhead saturated: {max_concurrent} calls in flight, waited {waited:?}")]
    SaturatedTimeout {
        /// Size of the bulkhead.
        max_concurrent: usize,
        /// How long the call queued before giving up.
        waited: Duration,
    },
    /// The bulkhead's semaphore was closed.
    #[error("bulkhead closed")]
    Closed,
    /// The inner service returned an error.
    #[error("{0}")]
    Inner(E),
}

impl<E> BulkheadError<E> {
    /// Returns true if the call never got a permit.
    pub fn is_saturated(&self) -> bool {
        matches!(self, BulkheadError::SaturatedTimeout { .. })
    }

    /// Converts this error into the inner error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BulkheadError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: Classify> Classify for BulkheadError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            BulkheadError::SaturatedTimeout { .. } => ErrorKind::Timeout,
            BulkheadError::Closed => ErrorKind::Unavailable,
            BulkheadError::Inner(e) => e.kind(),
        }
    }
}
