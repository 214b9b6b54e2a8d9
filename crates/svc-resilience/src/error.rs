//! Errors returned by policies and the registry.

use std::fmt;
use std::time::Duration;
use svc_resilience_bulkhead::BulkheadError;
use svc_resilience_circuitbreaker::CircuitBreakerError;
use svc_resilience_core::{Classify, ErrorKind};
use svc_resilience_retry::RetryError;
use svc_resilience_timelimiter::TimeLimiterError;

/// Error of one [`execute`](crate::ResiliencePolicy::execute) call.
///
/// Every variant is final: nothing above the policy should retry it. The
/// caller picks a fallback.
#[derive(Debug)]
pub enum ResilienceError<E> {
    /// The dependency's circuit is open; the operation was not invoked.
    CircuitOpen {
        /// Dependency name.
        name: String,
    },
    /// The execution's deadline passed, whether during an attempt or a
    /// backoff sleep.
    Timeout {
        /// Dependency name.
        name: String,
        /// Budget the execution had.
        timeout: Duration,
    },
    /// Every attempt failed with a retryable error. Holds the last one.
    RetryExhausted {
        /// Dependency name.
        name: String,
        /// Attempts made.
        attempts: usize,
        /// Error of the last attempt.
        source: E,
    },
    /// No bulkhead permit freed up before the deadline.
    BulkheadSaturated {
        /// Dependency name.
        name: String,
        /// Size of the bulkhead.
        max_concurrent: usize,
    },
    /// The operation failed with an error that is not retried.
    Application(E),
}

pub(crate) type StackError<E> =
    BulkheadError<TimeLimiterError<RetryError<CircuitBreakerError<E>>>>;

impl<E> ResilienceError<E> {
    /// Unwraps the layer errors of a policy's service stack.
    pub(crate) fn from_stack(err: StackError<E>, name: &str) -> Self {
        match err {
            BulkheadError::SaturatedTimeout { max_concurrent, .. } => {
                ResilienceError::BulkheadSaturated {
                    name: name.to_string(),
                    max_concurrent,
                }
            }
            BulkheadError::Closed => ResilienceError::BulkheadSaturated {
                name: name.to_string(),
                max_concurrent: 0,
            },
            BulkheadError::Inner(TimeLimiterError::Timeout { timeout }) => {
                ResilienceError::Timeout {
                    name: name.to_string(),
                    timeout,
                }
            }
            BulkheadError::Inner(TimeLimiterError::Inner(retry)) => match retry {
                RetryError::Exhausted { attempts, last } => match last {
                    CircuitBreakerError::Inner(source) => ResilienceError::RetryExhausted {
                        name: name.to_string(),
                        attempts,
                        source,
                    },
                    CircuitBreakerError::OpenCircuit => ResilienceError::CircuitOpen {
                        name: name.to_string(),
                    },
                },
                RetryError::Inner(CircuitBreakerError::OpenCircuit) => {
                    ResilienceError::CircuitOpen {
                        name: name.to_string(),
                    }
                }
                RetryError::Inner(CircuitBreakerError::Inner(e)) => ResilienceError::Application(e),
            },
        }
    }

    /// Returns `true` if the deadline passed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResilienceError::Timeout { .. })
    }

    /// Returns `true` if the circuit rejected the call.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen { .. })
    }

    /// Returns `true` if all attempts failed.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, ResilienceError::RetryExhausted { .. })
    }

    /// Returns `true` if the bulkhead had no permit in time.
    pub fn is_bulkhead_saturated(&self) -> bool {
        matches!(self, ResilienceError::BulkheadSaturated { .. })
    }

    /// Returns `true` for a non-retryable operation error.
    pub fn is_application(&self) -> bool {
        matches!(self, ResilienceError::Application(_))
    }

    /// Returns the operation's own error, from either an exhausted retry or a
    /// non-retryable failure.
    pub fn application_error(self) -> Option<E> {
        match self {
            ResilienceError::Application(e) | ResilienceError::RetryExhausted { source: e, .. } => {
                Some(e)
            }
            _ => None,
        }
    }

    /// Label used for logs and the `outcome` metric label.
    pub fn outcome_label(&self) -> &'static str {
        match self {
            ResilienceError::CircuitOpen { .. } => "circuit_open",
            ResilienceError::Timeout { .. } => "timeout",
            ResilienceError::RetryExhausted { .. } => "retry_exhausted",
            ResilienceError::BulkheadSaturated { .. } => "bulkhead_saturated",
            ResilienceError::Application(_) => "application_error",
        }
    }

    /// Maps the operation's error type.
    pub fn map_application<F, T>(self, f: F) -> ResilienceError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            ResilienceError::CircuitOpen { name } => ResilienceError::CircuitOpen { name },
            ResilienceError::Timeout { name, timeout } => {
                ResilienceError::Timeout { name, timeout }
            }
            ResilienceError::RetryExhausted {
                name,
                attempts,
                source,
            } => ResilienceError::RetryExhausted {
                name,
                attempts,
                source: f(source),
            },
            ResilienceError::BulkheadSaturated {
                name,
                max_concurrent,
            } => ResilienceError::BulkheadSaturated {
                name,
                max_concurrent,
            },
            ResilienceError::Application(e) => ResilienceError::Application(f(e)),
        }
    }
}

impl<E: Classify> ResilienceError<E> {
    /// Kind of the failure. An exhausted retry reports the kind of its last
    /// error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ResilienceError::Timeout { .. } => ErrorKind::Timeout,
            ResilienceError::BulkheadSaturated { .. } => ErrorKind::Unavailable,
            ResilienceError::RetryExhausted { source, .. } => source.kind(),
            ResilienceError::Application(e) => e.kind(),
        }
    }
}

impl<E: Classify> Classify for ResilienceError<E> {
    fn kind(&self) -> ErrorKind {
        ResilienceError::kind(self)
    }
}

impl<E: fmt::Display> fmt::Display for ResilienceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResilienceError::CircuitOpen { name } => write!(f, "circuit for '{name}' is open"),
            ResilienceError::Timeout { name, timeout } => {
                write!(f, "call to '{name}' exceeded its {timeout:?} deadline")
            }
            ResilienceError::RetryExhausted {
                name,
                attempts,
                source,
            } => write!(
                f,
                "call to '{name}' failed after {attempts} attempts: {source}"
            ),
            ResilienceError::BulkheadSaturated {
                name,
                max_concurrent,
            } => write!(
                f,
                "bulkhead for '{name}' saturated ({max_concurrent} calls in flight)"
            ),
            ResilienceError::Application(e) => write!(f, "{e}"),
        }
    }
}

impl<E> std::error::Error for ResilienceError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResilienceError::RetryExhausted { source, .. } => Some(source),
            ResilienceError::Application(e) => e.source(),
            _ => None,
        }
    }
}

/// A [`DependencyPolicyConfig`](crate::DependencyPolicyConfig) that cannot be
/// built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("dependency name must not be empty")]
    EmptyName,
    #[error("failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("recovery_timeout must be greater than zero")]
    ZeroRecoveryTimeout,
    #[error("max_retry_attempts must be at least 1")]
    ZeroRetryAttempts,
    #[error("per_call_timeout must be greater than zero")]
    ZeroPerCallTimeout,
    #[error("max_concurrent must be at least 1")]
    ZeroMaxConcurrent,
    #[error("base_delay {base_delay:?} is larger than max_delay {max_delay:?}")]
    BaseDelayExceedsMaxDelay {
        base_delay: Duration,
        max_delay: Duration,
    },
    #[error("per_call_timeout {per_call_timeout:?} is shorter than base_delay {base_delay:?}")]
    TimeoutBelowBaseDelay {
        per_call_timeout: Duration,
        base_delay: Duration,
    },
    #[error("backoff_factor must be a finite number of at least 1.0, got {0}")]
    InvalidBackoffFactor(f64),
    #[error("jitter must be within 0.0..=1.0, got {0}")]
    InvalidJitter(f64),
    #[error("circuit_open cannot be a retryable kind")]
    CircuitOpenRetryable,
}

/// Errors from building or querying a [`PolicyRegistry`](crate::PolicyRegistry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no policy registered for dependency '{0}'")]
    UnknownDependency(String),
    #[error("dependency '{0}' is registered twice")]
    DuplicateDependency(String),
    #[error("invalid policy for '{dependency}': {source}")]
    Config {
        dependency: String,
        #[source]
        source: ConfigError,
    },
    #[error("failed to parse policy document: {0}")]
    Parse(#[from] toml::de::Error),
}
