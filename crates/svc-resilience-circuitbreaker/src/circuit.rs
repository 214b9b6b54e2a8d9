use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use svc_resilience_core::ErrorKind;
use svc_resilience_store::{circuit_key, StoreError};
use tracing::{debug, info, warn};

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed = 0,
    /// The circuit is open and calls are rejected.
    Open = 1,
    /// One trial call is in flight; everyone else is rejected.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Returns the label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The circuit record shared between replicas.
///
/// Stored as JSON under `circuit:{name}`. `last_transition_ms` is wall-clock
/// milliseconds since the UNIX epoch so every replica can measure the
/// recovery window against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitRecord {
    /// Dependency name.
    pub name: String,
    /// Circuit state.
    pub state: CircuitState,
    /// Relevant failures counted since the last reset.
    pub failure_count: u32,
    /// When the circuit last changed state.
    pub last_transition_ms: u64,
}

impl CircuitRecord {
    /// The implicit record of a dependency that has never failed.
    pub fn closed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            last_transition_ms: 0,
        }
    }

    fn encode(&self) -> Result<String, StoreError> {
        serde_json::to_string(self).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn decode(raw: &str) -> Result<Self, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

/// What the breaker decided for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Circuit closed; carries the failure count observed at admission.
    Closed { failure_count: u32 },
    /// This caller won the half-open trial.
    Trial { failure_count: u32 },
    /// The call must fail fast.
    Rejected { state: CircuitState },
}

/// A read of the shared record: the raw value (needed for CAS) and its
/// decoded form. `None` means the key is absent.
struct Snapshot {
    raw: Option<String>,
    record: Option<CircuitRecord>,
}

/// Circuit state synchronised through the shared store.
///
/// The store is the preferred source of truth. Every successful read or
/// write is mirrored into a process-local shadow record; whenever the store
/// fails the breaker runs on the shadow alone until the store answers again.
pub(crate) struct DistributedCircuit {
    config: CircuitBreakerConfig,
    key: String,
    shadow: Mutex<CircuitRecord>,
    state_atomic: AtomicU8,
    degraded: AtomicBool,
}

impl DistributedCircuit {
    pub(crate) fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            key: circuit_key(&config.name),
            shadow: Mutex::new(CircuitRecord::closed(config.name.clone())),
            state_atomic: AtomicU8::new(CircuitState::Closed as u8),
            degraded: AtomicBool::new(false),
            config,
        }
    }

    pub(crate) fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Last state this process observed or wrote.
    pub(crate) fn current_state(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Returns true while the store is unreachable.
    pub(crate) fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Reads the shared record, falling back to the shadow copy.
    pub(crate) async fn record(&self) -> CircuitRecord {
        match self.read().await {
            Some(Snapshot {
                record: Some(record),
                ..
            }) => {
                self.observe(&record);
                record
            }
            Some(_) => CircuitRecord::closed(self.config.name.clone()),
            None => self.shadow.lock().clone(),
        }
    }

    /// Decides whether a call may proceed.
    pub(crate) async fn acquire(&self) -> Admission {
        let admission = match self.read().await {
            Some(snapshot) => self.admit_from_store(snapshot).await,
            None => self.admit_from_shadow(),
        };

        match admission {
            Admission::Closed { .. } => self.call_permitted(CircuitState::Closed, false),
            Admission::Trial { .. } => self.call_permitted(CircuitState::HalfOpen, true),
            Admission::Rejected { state } => self.call_rejected(state),
        }
        admission
    }

    /// Records a successful call.
    pub(crate) async fn on_success(&self, admission: Admission) {
        match admission {
            Admission::Trial { .. } => {
                self.emit_success(CircuitState::HalfOpen);
                self.close(CircuitState::HalfOpen).await;
            }
            Admission::Closed { failure_count } => {
                self.emit_success(CircuitState::Closed);
                if failure_count > 0 {
                    self.reset_count().await;
                }
            }
            Admission::Rejected { .. } => {}
        }
    }

    /// Records a failed call. Only kinds in `failure_kinds` count against the
    /// circuit.
    pub(crate) async fn on_failure(&self, admission: Admission, kind: ErrorKind) {
        let relevant = self.config.failure_kinds.contains(kind);
        if !relevant {
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::ErrorIgnored {
                    dependency: self.config.name.clone(),
                    timestamp: Instant::now(),
                    kind,
                });
        }

        match admission {
            Admission::Trial { failure_count } if relevant => {
                let count = failure_count
                    .saturating_add(1)
                    .max(self.config.failure_threshold);
                self.emit_failure(CircuitState::HalfOpen, kind, count);
                self.open(CircuitState::HalfOpen, count).await;
            }
            // The dependency answered, which is what the trial wanted to know.
            Admission::Trial { .. } => self.close(CircuitState::HalfOpen).await,
            Admission::Closed { .. } if relevant => self.increment(kind).await,
            Admission::Closed { .. } | Admission::Rejected { .. } => {}
        }
    }

    /// Opens the circuit regardless of its current state.
    pub(crate) async fn force_open(&self) {
        let (from, count) = {
            let shadow = self.shadow.lock();
            (shadow.state, shadow.failure_count)
        };
        self.open(from, count.max(self.config.failure_threshold))
            .await;
    }

    /// Closes the circuit and clears the failure count.
    pub(crate) async fn reset(&self) {
        let from = self.shadow.lock().state;
        self.close(from).await;
    }

    async fn admit_from_store(&self, snapshot: Snapshot) -> Admission {
        let Some(record) = snapshot.record else {
            // An absent key after we saw the circuit open means its TTL ran
            // out, grace included: the trial is up for grabs.
            let last = self.shadow.lock().clone();
            if last.state == CircuitState::Closed {
                self.observe(&CircuitRecord::closed(self.config.name.clone()));
                return Admission::Closed { failure_count: 0 };
            }
            if !self.recovery_elapsed(&last) {
                return Admission::Rejected { state: last.state };
            }
            return self.claim_trial(None, &last).await;
        };

        self.observe(&record);
        match record.state {
            CircuitState::Closed => Admission::Closed {
                failure_count: record.failure_count,
            },
            state if self.recovery_elapsed(&record) => {
                debug!(
                    dependency = %self.config.name,
                    state = %state,
                    "recovery window elapsed, contending for trial"
                );
                self.claim_trial(snapshot.raw.as_deref(), &record).await
            }
            state => Admission::Rejected { state },
        }
    }

    /// Races other replicas for the half-open trial. Only the CAS winner
    /// calls the dependency.
    async fn claim_trial(&self, expected: Option<&str>, prior: &CircuitRecord) -> Admission {
        let trial = CircuitRecord {
            name: self.config.name.clone(),
            state: CircuitState::HalfOpen,
            failure_count: prior.failure_count,
            last_transition_ms: self.config.clock.now_millis(),
        };

        let swapped = match trial.encode() {
            Ok(encoded) => {
                self.config
                    .store
                    .compare_and_set(
                        &self.key,
                        expected,
                        encoded,
                        Some(self.record_ttl()),
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        match swapped {
            Ok(true) => {
                self.store_ok();
                self.set_shadow(trial);
                self.transition(prior.state, CircuitState::HalfOpen);
                Admission::Trial {
                    failure_count: prior.failure_count,
                }
            }
            Ok(false) => {
                self.store_ok();
                debug!(dependency = %self.config.name, "lost trial race to another caller");
                Admission::Rejected {
                    state: CircuitState::HalfOpen,
                }
            }
            Err(e) => {
                self.store_failed(&e);
                self.admit_from_shadow()
            }
        }
    }

    /// Admission on process-local state, including a local CAS for the trial.
    fn admit_from_shadow(&self) -> Admission {
        let mut shadow = self.shadow.lock();
        let state = shadow.state;
        match state {
            CircuitState::Closed => Admission::Closed {
                failure_count: shadow.failure_count,
            },
            from if self.recovery_elapsed(&shadow) => {
                shadow.state = CircuitState::HalfOpen;
                shadow.last_transition_ms = self.config.clock.now_millis();
                let failure_count = shadow.failure_count;
                self.state_atomic
                    .store(CircuitState::HalfOpen as u8, Ordering::Release);
                drop(shadow);
                self.transition(from, CircuitState::HalfOpen);
                Admission::Trial { failure_count }
            }
            state => Admission::Rejected { state },
        }
    }

    async fn increment(&self, kind: ErrorKind) {
        let Some(snapshot) = self.read().await else {
            self.increment_shadow(kind);
            return;
        };

        let current = snapshot
            .record
            .unwrap_or_else(|| CircuitRecord::closed(self.config.name.clone()));
        if current.state != CircuitState::Closed {
            // Another caller already moved the circuit on.
            self.observe(&current);
            return;
        }

        let count = current.failure_count.saturating_add(1);
        self.emit_failure(CircuitState::Closed, kind, count);
        if count >= self.config.failure_threshold {
            self.open(CircuitState::Closed, count).await;
        } else {
            debug!(
                dependency = %self.config.name,
                failure_count = count,
                threshold = self.config.failure_threshold,
                "failure recorded"
            );
            let record = CircuitRecord {
                failure_count: count,
                ..current
            };
            self.write(record, None).await;
        }
    }

    fn increment_shadow(&self, kind: ErrorKind) {
        let mut shadow = self.shadow.lock();
        if shadow.state != CircuitState::Closed {
            return;
        }
        shadow.failure_count = shadow.failure_count.saturating_add(1);
        let count = shadow.failure_count;
        let opened = count >= self.config.failure_threshold;
        if opened {
            shadow.state = CircuitState::Open;
            shadow.last_transition_ms = self.config.clock.now_millis();
            self.state_atomic
                .store(CircuitState::Open as u8, Ordering::Release);
        }
        drop(shadow);

        self.emit_failure(CircuitState::Closed, kind, count);
        if opened {
            self.transition(CircuitState::Closed, CircuitState::Open);
        }
    }

    async fn reset_count(&self) {
        let Some(snapshot) = self.read().await else {
            let mut shadow = self.shadow.lock();
            if shadow.state == CircuitState::Closed {
                shadow.failure_count = 0;
            }
            return;
        };

        match snapshot.record {
            Some(record) if record.state == CircuitState::Closed && record.failure_count > 0 => {
                let record = CircuitRecord {
                    failure_count: 0,
                    ..record
                };
                self.write(record, None).await;
            }
            Some(record) => self.observe(&record),
            None => {}
        }
    }

    async fn open(&self, from: CircuitState, failure_count: u32) {
        let record = CircuitRecord {
            name: self.config.name.clone(),
            state: CircuitState::Open,
            failure_count,
            last_transition_ms: self.config.clock.now_millis(),
        };
        // Concurrent failures that all reached the threshold open once.
        let previous = std::mem::replace(&mut *self.shadow.lock(), record.clone());
        self.publish_state(CircuitState::Open);

        self.write(record, Some(self.record_ttl())).await;
        if previous.state != CircuitState::Open {
            self.transition(from, CircuitState::Open);
        }
    }

    async fn close(&self, from: CircuitState) {
        let record = CircuitRecord {
            name: self.config.name.clone(),
            state: CircuitState::Closed,
            failure_count: 0,
            last_transition_ms: self.config.clock.now_millis(),
        };
        self.write(record, None).await;
        self.transition(from, CircuitState::Closed);
    }

    /// TTL of `Open` and `HalfOpen` records: the recovery window plus the
    /// same again as grace. The record outlives the window, so replicas that
    /// never saw it open still meet it and race for the trial through CAS.
    /// A record left behind by a crashed replica expires after the grace.
    fn record_ttl(&self) -> Duration {
        self.config
            .recovery_timeout
            .saturating_add(self.config.recovery_timeout)
    }

    fn recovery_elapsed(&self, record: &CircuitRecord) -> bool {
        self.config.clock.elapsed_since(record.last_transition_ms) >= self.config.recovery_timeout
    }

    async fn read(&self) -> Option<Snapshot> {
        let result = match self.config.store.get(&self.key).await {
            Ok(Some(raw)) => CircuitRecord::decode(&raw).map(|record| Snapshot {
                raw: Some(raw),
                record: Some(record),
            }),
            Ok(None) => Ok(Snapshot {
                raw: None,
                record: None,
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => {
                self.store_ok();
                Some(snapshot)
            }
            Err(e) => {
                self.store_failed(&e);
                None
            }
        }
    }

    /// Writes `record` to the store (last writer wins) and to the shadow.
    async fn write(&self, record: CircuitRecord, ttl: Option<Duration>) {
        let result = match record.encode() {
            Ok(encoded) => {
                self.config
                    .store
                    .set_with_ttl(&self.key, encoded, ttl)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => self.store_ok(),
            Err(e) => self.store_failed(&e),
        }
        self.set_shadow(record);
    }

    /// Mirrors a record read from the store.
    fn observe(&self, record: &CircuitRecord) {
        let mut shadow = self.shadow.lock();
        // A read that started before our own transition landed.
        if record.state != shadow.state && record.last_transition_ms < shadow.last_transition_ms
        {
            return;
        }
        if *shadow != *record {
            *shadow = record.clone();
            self.publish_state(record.state);
        }
    }

    fn set_shadow(&self, record: CircuitRecord) {
        let state = record.state;
        *self.shadow.lock() = record;
        self.publish_state(state);
    }

    fn publish_state(&self, state: CircuitState) {
        self.state_atomic.store(state as u8, Ordering::Release);

        #[cfg(feature = "metrics")]
        gauge!("circuitbreaker_state", "circuitbreaker" => self.config.name.clone())
            .set(state as u8 as f64);
    }

    fn store_ok(&self) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            info!(
                dependency = %self.config.name,
                "shared state store reachable again, circuit is cluster-coherent"
            );
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::StoreRecovered {
                    dependency: self.config.name.clone(),
                    timestamp: Instant::now(),
                });
        }
    }

    fn store_failed(&self, error: &StoreError) {
        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_store_errors_total", "circuitbreaker" => self.config.name.clone())
            .increment(1);

        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                dependency = %self.config.name,
                error = %error,
                "shared state store unavailable, circuit falling back to process-local state"
            );
            self.config
                .event_listeners
                .emit(&CircuitBreakerEvent::StoreUnavailable {
                    dependency: self.config.name.clone(),
                    timestamp: Instant::now(),
                    error: error.to_string(),
                });
        } else {
            debug!(dependency = %self.config.name, error = %error, "shared state store still unavailable");
        }
    }

    fn transition(&self, from: CircuitState, to: CircuitState) {
        if from == to {
            return;
        }

        info!(
            dependency = %self.config.name,
            from = %from,
            to = %to,
            "circuit state transition"
        );

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                dependency: self.config.name.clone(),
                timestamp: Instant::now(),
                from_state: from,
                to_state: to,
            });

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_transitions_total",
            "circuitbreaker" => self.config.name.clone(),
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    fn call_permitted(&self, state: CircuitState, trial: bool) {
        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallPermitted {
                dependency: self.config.name.clone(),
                timestamp: Instant::now(),
                state,
                trial,
            });
    }

    fn call_rejected(&self, state: CircuitState) {
        debug!(dependency = %self.config.name, state = %state, "call rejected, circuit not closed");

        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallRejected {
                dependency: self.config.name.clone(),
                timestamp: Instant::now(),
                state,
            });

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_calls_total",
            "circuitbreaker" => self.config.name.clone(),
            "outcome" => "rejected"
        )
        .increment(1);
    }

    fn emit_success(&self, state: CircuitState) {
        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                dependency: self.config.name.clone(),
                timestamp: Instant::now(),
                state,
            });

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_calls_total",
            "circuitbreaker" => self.config.name.clone(),
            "outcome" => "success"
        )
        .increment(1);
    }

    fn emit_failure(&self, state: CircuitState, kind: ErrorKind, failure_count: u32) {
        self.config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                dependency: self.config.name.clone(),
                timestamp: Instant::now(),
                state,
                kind,
                failure_count,
            });

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_calls_total",
            "circuitbreaker" => self.config.name.clone(),
            "outcome" => "failure"
        )
        .increment(1);
    }
}
