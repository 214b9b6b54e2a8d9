//! Per-dependency policy configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use svc_resilience_core::{ErrorKind, RetryableKinds};

/// Resilience settings for one downstream dependency.
///
/// Durations are written as fractional seconds in configuration files:
///
/// ```toml
/// failure_threshold = 3
/// recovery_timeout = 10
/// base_delay = 0.25
/// per_call_timeout = 5.0
/// retryable_kinds = ["connection", "timeout", "unavailable", "rate_limited"]
/// ```
///
/// Keys left out take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DependencyPolicyConfig {
    /// Dependency name. Keys the shared circuit record and every log line.
    pub name: String,
    /// Consecutive relevant failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before allowing a trial.
    #[serde(with = "secs")]
    pub recovery_timeout: Duration,
    /// Total attempts per execution, the first one included.
    pub max_retry_attempts: usize,
    /// Delay before the second attempt.
    #[serde(with = "secs")]
    pub base_delay: Duration,
    /// Upper bound of any single backoff delay.
    #[serde(with = "secs")]
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_factor: f64,
    /// Fraction of each delay randomized in both directions.
    pub jitter: f64,
    /// Budget of one execution: bulkhead wait, every attempt and every
    /// backoff sleep.
    #[serde(with = "secs")]
    pub per_call_timeout: Duration,
    /// Calls allowed in flight at once in this process.
    pub max_concurrent: usize,
    /// Error kinds that are retried and count toward the circuit.
    pub retryable_kinds: RetryableKinds,
}

impl Default for DependencyPolicyConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            max_retry_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: 0.2,
            per_call_timeout: Duration::from_secs(30),
            max_concurrent: 25,
            retryable_kinds: RetryableKinds::default(),
        }
    }
}

impl DependencyPolicyConfig {
    /// Starts a builder with defaults for the named dependency.
    pub fn builder(name: impl Into<String>) -> DependencyPolicyConfigBuilder {
        DependencyPolicyConfigBuilder {
            config: DependencyPolicyConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Checks the settings against each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.recovery_timeout.is_zero() {
            return Err(ConfigError::ZeroRecoveryTimeout);
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.per_call_timeout.is_zero() {
            return Err(ConfigError::ZeroPerCallTimeout);
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroMaxConcurrent);
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::BaseDelayExceedsMaxDelay {
                base_delay: self.base_delay,
                max_delay: self.max_delay,
            });
        }
        if self.per_call_timeout < self.base_delay {
            return Err(ConfigError::TimeoutBelowBaseDelay {
                per_call_timeout: self.per_call_timeout,
                base_delay: self.base_delay,
            });
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidBackoffFactor(self.backoff_factor));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::InvalidJitter(self.jitter));
        }
        if self.retryable_kinds.contains(ErrorKind::CircuitOpen) {
            return Err(ConfigError::CircuitOpenRetryable);
        }
        Ok(())
    }
}

/// Builder for [`DependencyPolicyConfig`].
#[derive(Debug, Clone)]
pub struct DependencyPolicyConfigBuilder {
    config: DependencyPolicyConfig,
}

impl DependencyPolicyConfigBuilder {
    /// Consecutive relevant failures that open the circuit.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Time an open circuit waits before a trial call.
    ///
    /// Default: 60 seconds
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Total attempts per execution.
    ///
    /// Default: 3
    pub fn max_retry_attempts(mut self, attempts: usize) -> Self {
        self.config.max_retry_attempts = attempts;
        self
    }

    /// Delay before the first retry.
    ///
    /// Default: 1 second
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Cap on a single backoff delay.
    ///
    /// Default: 60 seconds
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Default: 2.0
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.backoff_factor = factor;
        self
    }

    /// Default: 0.2
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Budget of a whole execution, retries included.
    ///
    /// Default: 30 seconds
    pub fn per_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.per_call_timeout = timeout;
        self
    }

    /// Default: 25
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Error kinds retried and counted toward the circuit.
    ///
    /// Default: connection, timeout, unavailable
    pub fn retryable_kinds(mut self, kinds: RetryableKinds) -> Self {
        self.config.retryable_kinds = kinds;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<DependencyPolicyConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Durations as fractional seconds.
mod secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Float(secs),
                &"a non-negative number of seconds",
            )
        })
    }
}
