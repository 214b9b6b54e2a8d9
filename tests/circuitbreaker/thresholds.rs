use super::{cluster, replica, Failure};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use svc_resilience_circuitbreaker::{CircuitBreakerLayer, CircuitState};
use svc_resilience_core::ErrorKind;
use tower::{service_fn, Layer, ServiceExt};

async fn call(layer: &CircuitBreakerLayer, calls: &Arc<AtomicUsize>, outcome: Result<(), Failure>) {
    let calls = Arc::clone(calls);
    let svc = layer.layer(service_fn(move |_: ()| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { outcome }
    }));
    let _ = svc.oneshot(()).await;
}

#[tokio::test]
async fn opens_after_threshold_and_stops_invoking() {
    let (store, clock) = cluster();
    let layer = replica(&store, &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        call(&layer, &calls, Err(Failure(ErrorKind::Connection))).await;
    }
    assert_eq!(layer.current_state(), CircuitState::Open);

    for _ in 0..10 {
        call(&layer, &calls, Ok(())).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn two_failures_stay_closed() {
    let (store, clock) = cluster();
    let layer = replica(&store, &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    call(&layer, &calls, Err(Failure(ErrorKind::Timeout))).await;
    call(&layer, &calls, Err(Failure(ErrorKind::Timeout))).await;

    let record = layer.record().await;
    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.failure_count, 2);
}

#[tokio::test]
async fn success_clears_consecutive_failures() {
    let (store, clock) = cluster();
    let layer = replica(&store, &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        call(&layer, &calls, Err(Failure(ErrorKind::Unavailable))).await;
    }
    call(&layer, &calls, Ok(())).await;
    for _ in 0..2 {
        call(&layer, &calls, Err(Failure(ErrorKind::Unavailable))).await;
    }

    let record = layer.record().await;
    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.failure_count, 2);
}

#[tokio::test]
async fn errors_outside_failure_kinds_never_open() {
    let (store, clock) = cluster();
    let layer = replica(&store, &clock);
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..10 {
        call(&layer, &calls, Err(Failure(ErrorKind::Validation))).await;
        call(&layer, &calls, Err(Failure(ErrorKind::NotFound))).await;
    }

    assert_eq!(layer.current_state(), CircuitState::Closed);
    assert_eq!(layer.record().await.failure_count, 0);
}

#[tokio::test]
async fn custom_failure_kinds() {
    let (store, clock) = cluster();
    let layer = CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(2)
        .recovery_timeout(Duration::from_secs(10))
        .failure_kinds([ErrorKind::Server].into_iter().collect())
        .store(store)
        .clock(clock)
        .build();
    let calls = Arc::new(AtomicUsize::new(0));

    call(&layer, &calls, Err(Failure(ErrorKind::Connection))).await;
    call(&layer, &calls, Err(Failure(ErrorKind::Connection))).await;
    assert_eq!(layer.current_state(), CircuitState::Closed);

    call(&layer, &calls, Err(Failure(ErrorKind::Server))).await;
    call(&layer, &calls, Err(Failure(ErrorKind::Server))).await;
    assert_eq!(layer.current_state(), CircuitState::Open);
}

#[tokio::test]
async fn transition_callback_reports_open() {
    let (store, clock) = cluster();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = Arc::clone(&transitions);
    let layer = CircuitBreakerLayer::builder()
        .name("orders")
        .failure_threshold(1)
        .store(store)
        .clock(clock)
        .on_state_transition(move |from, to| t.lock().unwrap().push((from, to)))
        .build();
    let calls = Arc::new(AtomicUsize::new(0));

    call(&layer, &calls, Err(Failure(ErrorKind::Connection))).await;

    assert_eq!(
        *transitions.lock().unwrap(),
        vec![(CircuitState::Closed, CircuitState::Open)]
    );
}
