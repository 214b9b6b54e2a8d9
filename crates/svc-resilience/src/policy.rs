//! The per-dependency composition root.

use crate::config::DependencyPolicyConfig;
use crate::error::{ConfigError, ResilienceError};
use crate::outcome::ExecutionOutcome;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use svc_resilience_bulkhead::{BulkheadEvent, BulkheadLayer};
use svc_resilience_circuitbreaker::{
    CircuitBreakerEvent, CircuitBreakerLayer, CircuitRecord, CircuitState,
};
use svc_resilience_core::{
    deadline_after, CallContext, Classify, Clock, EventListeners, SharedClock, SystemClock,
};
use svc_resilience_retry::{ExponentialBackoff, RetryEvent, RetryLayer};
use svc_resilience_store::{InMemoryStore, SharedStateStore, SharedStore};
use svc_resilience_timelimiter::{TimeLimiterEvent, TimeLimiterLayer};
use tower::{ServiceBuilder, ServiceExt};
use tracing::debug;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};
#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Resilience policy of one dependency.
///
/// A call made through [`execute`](Self::execute) passes, outermost first,
/// through:
///
/// 1. the bulkhead, which holds a permit for the whole execution,
/// 2. the time limiter, whose deadline covers every attempt and backoff sleep,
/// 3. the retry loop,
/// 4. the circuit breaker, which sees each attempt separately,
/// 5. the operation.
///
/// The layers own the per-dependency state, so building the service stack on
/// each call is cheap and never resets a circuit or a semaphore. Build a
/// policy once per dependency and share it; a
/// [`PolicyRegistry`](crate::PolicyRegistry) does that for a whole service.
#[derive(Clone)]
pub struct ResiliencePolicy {
    config: Arc<DependencyPolicyConfig>,
    bulkhead: BulkheadLayer,
    time_limiter: TimeLimiterLayer,
    retry: RetryLayer,
    circuit_breaker: CircuitBreakerLayer,
}

impl ResiliencePolicy {
    /// Starts a builder for a policy with the given settings.
    pub fn builder(config: DependencyPolicyConfig) -> ResiliencePolicyBuilder {
        #[cfg(feature = "metrics")]
        {
            METRICS_INIT.call_once(|| {
                describe_counter!(
                    "resilience_executions_total",
                    "Total number of policy executions by outcome"
                );
                describe_histogram!(
                    "resilience_execution_duration_seconds",
                    "Wall time of policy executions, bulkhead wait included"
                );
            });
        }
        ResiliencePolicyBuilder {
            config,
            store: None,
            clock: None,
            circuit_breaker_listeners: EventListeners::new(),
            retry_listeners: EventListeners::new(),
            time_limiter_listeners: EventListeners::new(),
            bulkhead_listeners: EventListeners::new(),
        }
    }

    /// Validates `config` and builds a policy whose circuit lives in `store`.
    pub fn build(config: DependencyPolicyConfig, store: SharedStore) -> Result<Self, ConfigError> {
        Self::builder(config).shared_store(store).build()
    }

    /// Dependency name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The settings this policy was built from.
    pub fn config(&self) -> &DependencyPolicyConfig {
        &self.config
    }

    /// Last circuit state this process observed. Does not touch the store.
    pub fn current_state(&self) -> CircuitState {
        self.circuit_breaker.current_state()
    }

    /// Reads the shared circuit record.
    pub async fn circuit_record(&self) -> CircuitRecord {
        self.circuit_breaker.record().await
    }

    /// The circuit breaker layer, for operator controls such as
    /// [`force_open`](CircuitBreakerLayer::force_open).
    pub fn circuit_breaker(&self) -> &CircuitBreakerLayer {
        &self.circuit_breaker
    }

    /// The bulkhead layer.
    pub fn bulkhead(&self) -> &BulkheadLayer {
        &self.bulkhead
    }

    /// Runs `operation` under this policy.
    ///
    /// The operation gets a [`CallContext`] per attempt. Its cancellation
    /// token fires when the execution's deadline passes; long-running work
    /// should watch it.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + Send + 'static,
    {
        self.execute_with_outcome(operation).await.0
    }

    /// Like [`execute`](Self::execute), and also reports how the execution
    /// went.
    pub async fn execute_with_outcome<F, Fut, T, E>(
        &self,
        operation: F,
    ) -> (Result<T, ResilienceError<E>>, ExecutionOutcome)
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + Send + 'static,
    {
        let start = tokio::time::Instant::now();
        let ctx = CallContext::new(self.config.name.as_str())
            .with_deadline(deadline_after(start, self.config.per_call_timeout));
        let observed = ctx.clone();

        let operation = Arc::new(operation);
        let service = ServiceBuilder::new()
            .layer(self.bulkhead.clone())
            .layer(self.time_limiter.clone())
            .layer(self.retry.clone())
            .map_request(|ctx: CallContext| {
                ctx.begin_attempt();
                ctx
            })
            .layer(self.circuit_breaker.clone())
            .service_fn(move |ctx: CallContext| (*operation)(ctx));

        let result = service
            .oneshot(ctx)
            .await
            .map_err(|err| ResilienceError::from_stack(err, &self.config.name));

        let outcome = ExecutionOutcome {
            attempts_made: observed.attempts(),
            final_error: result.as_ref().err().map(ResilienceError::kind),
            total_elapsed: start.elapsed(),
        };
        let label = match &result {
            Ok(_) => "success",
            Err(err) => err.outcome_label(),
        };

        #[cfg(feature = "metrics")]
        {
            counter!(
                "resilience_executions_total",
                "dependency" => self.config.name.clone(),
                "outcome" => label
            )
            .increment(1);
            histogram!(
                "resilience_execution_duration_seconds",
                "dependency" => self.config.name.clone()
            )
            .record(outcome.total_elapsed.as_secs_f64());
        }

        debug!(
            dependency = %self.config.name,
            outcome = label,
            attempts = outcome.attempts_made,
            elapsed_ms = outcome.total_elapsed.as_millis() as u64,
            "execution finished"
        );

        (result, outcome)
    }
}

impl fmt::Debug for ResiliencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResiliencePolicy")
            .field("name", &self.config.name)
            .field("state", &self.current_state())
            .field("in_flight", &self.bulkhead.in_flight())
            .finish()
    }
}

/// Builder for a [`ResiliencePolicy`].
pub struct ResiliencePolicyBuilder {
    config: DependencyPolicyConfig,
    store: Option<SharedStore>,
    clock: Option<SharedClock>,
    circuit_breaker_listeners: EventListeners<CircuitBreakerEvent>,
    retry_listeners: EventListeners<RetryEvent>,
    time_limiter_listeners: EventListeners<TimeLimiterEvent>,
    bulkhead_listeners: EventListeners<BulkheadEvent>,
}

impl ResiliencePolicyBuilder {
    /// Store holding the circuit record.
    ///
    /// Default: a process-local [`InMemoryStore`], which does not share state
    /// across replicas.
    pub fn store<S: SharedStateStore>(self, store: S) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Like [`store`](Self::store), for an already shared store.
    pub fn shared_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Wall clock used for circuit timestamps.
    ///
    /// Default: [`SystemClock`]
    pub fn clock<C: Clock>(self, clock: C) -> Self {
        self.shared_clock(Arc::new(clock))
    }

    /// Like [`clock`](Self::clock), for an already shared clock.
    pub fn shared_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Adds listeners for circuit breaker events.
    pub fn circuit_breaker_listeners(
        mut self,
        listeners: &EventListeners<CircuitBreakerEvent>,
    ) -> Self {
        self.circuit_breaker_listeners.extend(listeners);
        self
    }

    /// Adds listeners for retry events.
    pub fn retry_listeners(mut self, listeners: &EventListeners<RetryEvent>) -> Self {
        self.retry_listeners.extend(listeners);
        self
    }

    /// Adds listeners for time limiter events.
    pub fn time_limiter_listeners(mut self, listeners: &EventListeners<TimeLimiterEvent>) -> Self {
        self.time_limiter_listeners.extend(listeners);
        self
    }

    /// Adds listeners for bulkhead events.
    pub fn bulkhead_listeners(mut self, listeners: &EventListeners<BulkheadEvent>) -> Self {
        self.bulkhead_listeners.extend(listeners);
        self
    }

    /// Validates the settings and builds the policy.
    pub fn build(self) -> Result<ResiliencePolicy, ConfigError> {
        let config = self.config;
        config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as SharedClock);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::with_clock(Arc::clone(&clock))) as SharedStore);

        let circuit_breaker = CircuitBreakerLayer::builder()
            .name(config.name.clone())
            .failure_threshold(config.failure_threshold)
            .recovery_timeout(config.recovery_timeout)
            .failure_kinds(config.retryable_kinds.clone())
            .shared_store(store)
            .clock(clock)
            .event_listeners(&self.circuit_breaker_listeners)
            .build();

        let backoff = ExponentialBackoff::new(config.base_delay)
            .multiplier(config.backoff_factor)
            .max_interval(config.max_delay)
            .jitter(config.jitter);
        let retry = RetryLayer::builder()
            .name(config.name.clone())
            .max_attempts(config.max_retry_attempts)
            .backoff(backoff)
            .retry_on(config.retryable_kinds.clone())
            .event_listeners(&self.retry_listeners)
            .build();

        let time_limiter = TimeLimiterLayer::builder()
            .name(config.name.clone())
            .timeout(config.per_call_timeout)
            .event_listeners(&self.time_limiter_listeners)
            .build();

        let bulkhead = BulkheadLayer::builder()
            .name(config.name.clone())
            .max_concurrent(config.max_concurrent)
            .event_listeners(&self.bulkhead_listeners)
            .build();

        debug!(
            dependency = %config.name,
            failure_threshold = config.failure_threshold,
            max_retry_attempts = config.max_retry_attempts,
            per_call_timeout_ms = config.per_call_timeout.as_millis() as u64,
            max_concurrent = config.max_concurrent,
            "resilience policy built"
        );

        Ok(ResiliencePolicy {
            config: Arc::new(config),
            bulkhead,
            time_limiter,
            retry,
            circuit_breaker,
        })
    }
}
