use super::{cluster, Failure};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svc_resilience_circuitbreaker::{CircuitBreakerLayer, CircuitState};
use svc_resilience_core::ErrorKind;
use tower::{service_fn, Layer, ServiceExt};

#[tokio::test]
async fn outage_never_reaches_the_caller() {
    let (store, clock) = cluster();
    let outages = Arc::new(AtomicUsize::new(0));
    let o = Arc::clone(&outages);
    let layer = CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(3)
        .recovery_timeout(Duration::from_secs(10))
        .store(store.clone())
        .clock(clock.clone())
        .on_store_unavailable(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    store.set_available(false);

    for _ in 0..5 {
        let svc = layer.layer(service_fn(|_: ()| async { Ok::<_, Failure>("served") }));
        assert_eq!(svc.oneshot(()).await.unwrap(), "served");
    }

    assert!(layer.is_degraded());
    assert_eq!(outages.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shadow_state_protects_during_outage() {
    let (store, clock) = cluster();
    let layer = CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(3)
        .recovery_timeout(Duration::from_secs(10))
        .store(store.clone())
        .clock(clock.clone())
        .build();
    store.set_available(false);

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..6 {
        let calls = Arc::clone(&calls);
        let svc = layer.layer(service_fn(move |_: ()| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Failure(ErrorKind::Connection)) }
        }));
        let _ = svc.oneshot(()).await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(layer.current_state(), CircuitState::Open);

    clock.advance(Duration::from_secs(10));
    let svc = layer.layer(service_fn(|_: ()| async { Ok::<_, Failure>(()) }));
    assert!(svc.oneshot(()).await.is_ok());
    assert_eq!(layer.current_state(), CircuitState::Closed);
}

#[tokio::test]
async fn recovery_resumes_shared_state() {
    let (store, clock) = cluster();
    let layer = CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(2)
        .store(store.clone())
        .clock(clock.clone())
        .build();
    let other = CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(2)
        .store(store.clone())
        .clock(clock)
        .build();

    store.set_available(false);
    let svc = layer.layer(service_fn(|_: ()| async { Ok::<_, Failure>(()) }));
    svc.clone().oneshot(()).await.unwrap();
    assert!(layer.is_degraded());

    store.set_available(true);
    other.force_open().await;
    assert!(svc.oneshot(()).await.unwrap_err().is_circuit_open());
    assert!(!layer.is_degraded());
}
