use std::time::Duration;
use svc_resilience_core::ErrorKind;

/// What happened during one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Attempts that reached the circuit breaker, fast-failed ones included.
    pub attempts_made: usize,
    /// Kind of the error returned to the caller, if any.
    pub final_error: Option<ErrorKind>,
    /// Wall time from entering the policy to returning, bulkhead wait
    /// included.
    pub total_elapsed: Duration,
}

impl ExecutionOutcome {
    /// Returns true if the execution returned a value.
    pub fn is_success(&self) -> bool {
        self.final_error.is_none()
    }
}
