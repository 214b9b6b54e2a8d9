//! Per-call context threaded through a policy's layer stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// About 30 years; the same horizon tokio uses for an unbounded sleep.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + budget`, or a far-future instant when that overflows.
pub fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// The request value every layer of a resilience policy receives.
///
/// A context is created once per `execute` call and cloned for each retry
/// attempt. Clones share the attempt counter and observe the same
/// cancellation signal.
///
/// # Cancellation contract
///
/// When the call's deadline passes, the time limiter cancels the token
/// returned by [`CallContext::cancellation`] and drops the in-flight future.
/// Operations that hand work to other tasks (spawned requests, streaming
/// reads) must watch the token and abandon that work promptly; cancellation
/// is advisory, never preemptive.
#[derive(Debug, Clone)]
pub struct CallContext {
    dependency: Arc<str>,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
    attempts: Arc<AtomicUsize>,
}

impl CallContext {
    /// Creates a context for a call to `dependency` with no deadline.
    pub fn new(dependency: impl Into<Arc<str>>) -> Self {
        Self {
            dependency: dependency.into(),
            deadline: None,
            cancellation: CancellationToken::new(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets the absolute deadline for the whole call.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Replaces the cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Name of the dependency being called.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Absolute deadline for the whole call, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Token cancelled when the call is abandoned.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns true once the call has been abandoned.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Records the start of a new attempt and returns its 1-based number.
    pub fn begin_attempt(&self) -> usize {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}
