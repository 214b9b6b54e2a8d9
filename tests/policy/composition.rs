use super::{fast_retries, Calls, Cluster, PaymentError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use svc_resilience::{CircuitState, DependencyPolicyConfig, ErrorKind, ResilienceError};
use svc_resilience_circuitbreaker::CircuitBreakerEvent;
use svc_resilience_core::{EventListeners, FnListener};
use svc_resilience_retry::RetryEvent;

#[tokio::test(start_paused = true)]
async fn every_attempt_counts_toward_the_threshold() {
    let cluster = Cluster::new();
    let policy = cluster.policy(fast_retries(
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(3)
            .max_retry_attempts(5),
    ));
    let calls = Calls::default();

    let c = calls.clone();
    let (result, outcome) = policy
        .execute_with_outcome(move |_| {
            c.hit();
            async { Err::<(), _>(PaymentError::GatewayDown) }
        })
        .await;

    // The fourth attempt meets the open circuit, which is never retried.
    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(calls.count(), 3);
    assert_eq!(outcome.attempts_made, 4);
    assert_eq!(outcome.final_error, Some(ErrorKind::CircuitOpen));
    assert_eq!(policy.current_state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_the_last_error() {
    let cluster = Cluster::new();
    let policy = cluster.policy(fast_retries(
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(10)
            .max_retry_attempts(3),
    ));

    let err = policy
        .execute(|_| async { Err::<(), _>(PaymentError::GatewayDown) })
        .await
        .unwrap_err();

    match err {
        ResilienceError::RetryExhausted {
            name,
            attempts,
            source,
        } => {
            assert_eq!(name, "payments");
            assert_eq!(attempts, 3);
            assert_eq!(source, PaymentError::GatewayDown);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(policy.circuit_record().await.failure_count, 3);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_passes_through_uncounted() {
    let cluster = Cluster::new();
    let policy = cluster.policy(fast_retries(
        DependencyPolicyConfig::builder("payments").max_retry_attempts(4),
    ));
    let calls = Calls::default();

    let c = calls.clone();
    let (result, outcome) = policy
        .execute_with_outcome(move |_| {
            c.hit();
            async { Err::<(), _>(PaymentError::Declined) }
        })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_application());
    assert_eq!(err.application_error(), Some(PaymentError::Declined));
    assert_eq!(calls.count(), 1);
    assert_eq!(outcome.attempts_made, 1);
    assert_eq!(policy.circuit_record().await.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_covers_the_whole_retry_sequence() {
    let cluster = Cluster::new();
    let policy = cluster.policy(
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(10)
            .max_retry_attempts(5)
            .base_delay(Duration::from_secs(1))
            .jitter(0.0)
            .per_call_timeout(Duration::from_millis(2500)),
    );
    let calls = Calls::default();

    let c = calls.clone();
    let (result, outcome) = policy
        .execute_with_outcome(move |_| {
            c.hit();
            async { Err::<(), _>(PaymentError::GatewayDown) }
        })
        .await;

    // Attempts at 0s and 1s; the 2s sleep before the third crosses 2.5s.
    match result.unwrap_err() {
        ResilienceError::Timeout { name, timeout } => {
            assert_eq!(name, "payments");
            assert_eq!(timeout, Duration::from_millis(2500));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.count(), 2);
    assert_eq!(outcome.total_elapsed, Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn slow_attempt_times_out_without_opening_the_circuit() {
    let cluster = Cluster::new();
    let policy = cluster.policy(
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(1)
            .base_delay(Duration::from_millis(100))
            .per_call_timeout(Duration::from_secs(1)),
    );

    let err = policy
        .execute(|_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, PaymentError>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(policy.current_state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn builder_listeners_observe_each_layer() {
    let cluster = Cluster::new();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let retries = Arc::new(Mutex::new(Vec::new()));

    let mut breaker_listeners = EventListeners::new();
    let t = Arc::clone(&transitions);
    breaker_listeners.add(FnListener::new(move |event: &CircuitBreakerEvent| {
        if let CircuitBreakerEvent::StateTransition {
            from_state,
            to_state,
            ..
        } = event
        {
            t.lock().unwrap().push((*from_state, *to_state));
        }
    }));
    let mut retry_listeners = EventListeners::new();
    let r = Arc::clone(&retries);
    retry_listeners.add(FnListener::new(move |event: &RetryEvent| {
        if let RetryEvent::Retry { attempt, .. } = event {
            r.lock().unwrap().push(*attempt);
        }
    }));

    let config = fast_retries(
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(2)
            .max_retry_attempts(3),
    )
    .build()
    .unwrap();
    let policy = svc_resilience::ResiliencePolicy::builder(config)
        .store(cluster.store.clone())
        .clock(cluster.clock.clone())
        .circuit_breaker_listeners(&breaker_listeners)
        .retry_listeners(&retry_listeners)
        .build()
        .unwrap();

    let _ = policy
        .execute(|_| async { Err::<(), _>(PaymentError::GatewayDown) })
        .await;

    assert_eq!(
        *transitions.lock().unwrap(),
        vec![(CircuitState::Closed, CircuitState::Open)]
    );
    assert_eq!(*retries.lock().unwrap(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeout_runs_normally() {
    let cluster = Cluster::new();
    let policy = cluster.policy(
        DependencyPolicyConfig::builder("payments")
            .per_call_timeout(Duration::from_secs(u64::MAX / 2)),
    );

    let value = policy.execute(|_| async { Ok::<_, PaymentError>(1) }).await;
    assert_eq!(value.unwrap(), 1);
}
