use super::{Calls, Cluster, PaymentError};
use std::time::Duration;
use svc_resilience::{CircuitState, DependencyPolicyConfig, ResilienceError};

#[tokio::test(start_paused = true)]
async fn breaker_lifecycle_through_execute() {
    let cluster = Cluster::new();
    let policy = cluster.policy(
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(3)
            .recovery_timeout(Duration::from_secs(10))
            .max_retry_attempts(1),
    );
    let calls = Calls::default();

    // Three consecutive failures open the circuit.
    for _ in 0..3 {
        let c = calls.clone();
        let err = policy
            .execute(move |_| {
                c.hit();
                async { Err::<(), _>(PaymentError::GatewayDown) }
            })
            .await
            .unwrap_err();
        assert!(!err.is_circuit_open());
    }
    assert_eq!(policy.current_state(), CircuitState::Open);
    assert_eq!(calls.count(), 3);

    // t = 2s: rejected without invoking the operation.
    cluster.clock.advance(Duration::from_secs(2));
    let c = calls.clone();
    let err = policy
        .execute(move |_| {
            c.hit();
            async { Ok::<_, PaymentError>("charged") }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ResilienceError::CircuitOpen { ref name } if name == "payments"));
    assert_eq!(calls.count(), 3);

    // t = 11s: exactly one trial, which succeeds.
    cluster.clock.advance(Duration::from_secs(9));
    let c = calls.clone();
    let receipt = policy
        .execute(move |_| {
            c.hit();
            async { Ok::<_, PaymentError>("charged") }
        })
        .await
        .unwrap();
    assert_eq!(receipt, "charged");
    assert_eq!(calls.count(), 4);
    assert_eq!(policy.current_state(), CircuitState::Closed);

    // t = 12s: business as usual.
    cluster.clock.advance(Duration::from_secs(1));
    let c = calls.clone();
    policy
        .execute(move |_| {
            c.hit();
            async { Ok::<_, PaymentError>("charged") }
        })
        .await
        .unwrap();
    let record = policy.circuit_record().await;
    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.failure_count, 0);
    assert_eq!(calls.count(), 5);
}

#[tokio::test(start_paused = true)]
async fn failed_trial_reopens_for_every_replica() {
    let cluster = Cluster::new();
    let config = || {
        DependencyPolicyConfig::builder("payments")
            .failure_threshold(2)
            .recovery_timeout(Duration::from_secs(10))
            .max_retry_attempts(1)
    };
    let replica_a = cluster.policy(config());
    let replica_b = cluster.policy(config());

    for _ in 0..2 {
        let _ = replica_a
            .execute(|_| async { Err::<(), _>(PaymentError::GatewayDown) })
            .await;
    }
    assert!(replica_b
        .execute(|_| async { Ok::<_, PaymentError>(()) })
        .await
        .unwrap_err()
        .is_circuit_open());

    cluster.clock.advance(Duration::from_secs(11));
    let _ = replica_b
        .execute(|_| async { Err::<(), _>(PaymentError::GatewayDown) })
        .await;

    assert_eq!(replica_b.current_state(), CircuitState::Open);
    assert!(replica_a
        .execute(|_| async { Ok::<_, PaymentError>(()) })
        .await
        .unwrap_err()
        .is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn store_outage_is_invisible_to_callers() {
    let cluster = Cluster::new();
    let policy = cluster.policy(DependencyPolicyConfig::builder("payments"));
    cluster.store.set_available(false);

    let result = policy
        .execute(|_| async { Ok::<_, PaymentError>("charged") })
        .await;
    assert_eq!(result.unwrap(), "charged");
    assert!(policy.circuit_breaker().is_degraded());

    cluster.store.set_available(true);
    policy
        .execute(|_| async { Ok::<_, PaymentError>("charged") })
        .await
        .unwrap();
    assert!(!policy.circuit_breaker().is_degraded());
}
