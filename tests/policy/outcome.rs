use super::{fast_retries, Calls, Cluster, PaymentError};
use std::time::Duration;
use svc_resilience::{DependencyPolicyConfig, ErrorKind};

#[tokio::test(start_paused = true)]
async fn recovery_after_one_retry() {
    let cluster = Cluster::new();
    let policy = cluster.policy(
        DependencyPolicyConfig::builder("inventory")
            .base_delay(Duration::from_millis(200))
            .jitter(0.0),
    );
    let calls = Calls::default();

    let c = calls.clone();
    let (result, outcome) = policy
        .execute_with_outcome(move |_| {
            let n = c.hit();
            async move {
                if n == 1 {
                    Err(PaymentError::GatewayDown)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 2);
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts_made, 2);
    assert_eq!(outcome.final_error, None);
    assert_eq!(outcome.total_elapsed, Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn open_circuit_counts_one_attempt_and_no_invocation() {
    let cluster = Cluster::new();
    let policy = cluster.policy(fast_retries(DependencyPolicyConfig::builder("inventory")));
    policy.circuit_breaker().force_open().await;
    let calls = Calls::default();

    let c = calls.clone();
    let (result, outcome) = policy
        .execute_with_outcome(move |_| {
            c.hit();
            async { Ok::<_, PaymentError>(()) }
        })
        .await;

    assert!(result.unwrap_err().is_circuit_open());
    assert_eq!(calls.count(), 0);
    assert_eq!(outcome.attempts_made, 1);
    assert_eq!(outcome.final_error, Some(ErrorKind::CircuitOpen));
    assert_eq!(outcome.total_elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn outcome_reports_the_exhausted_kind() {
    let cluster = Cluster::new();
    let policy = cluster.policy(fast_retries(
        DependencyPolicyConfig::builder("inventory")
            .failure_threshold(10)
            .max_retry_attempts(2),
    ));

    let (result, outcome) = policy
        .execute_with_outcome(|_| async { Err::<(), _>(PaymentError::GatewayDown) })
        .await;

    let err = result.unwrap_err();
    assert!(err.is_retry_exhausted());
    assert_eq!(err.outcome_label(), "retry_exhausted");
    assert_eq!(outcome.attempts_made, 2);
    assert_eq!(outcome.final_error, Some(ErrorKind::Connection));
    assert!(!outcome.is_success());
}
