use std::time::Duration;
use svc_resilience_core::CallContext;
use svc_resilience_timelimiter::{TimeLimiterError, TimeLimiterLayer};
use tower::{service_fn, Layer, ServiceExt};

async fn run_for(work: Duration, timeout: Duration) -> Result<(), TimeLimiterError<std::io::Error>> {
    let layer = TimeLimiterLayer::builder()
        .name("pricing")
        .timeout(timeout)
        .build();
    let svc = layer.layer(service_fn(move |_: CallContext| async move {
        tokio::time::sleep(work).await;
        Ok::<_, std::io::Error>(())
    }));
    svc.oneshot(CallContext::new("pricing")).await
}

#[tokio::test(start_paused = true)]
async fn just_inside_the_deadline_succeeds() {
    assert!(run_for(Duration::from_millis(2_999), Duration::from_secs(3)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn just_past_the_deadline_times_out() {
    match run_for(Duration::from_millis(3_001), Duration::from_secs(3)).await {
        Err(TimeLimiterError::Timeout { timeout }) => assert_eq!(timeout, Duration::from_secs(3)),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_callback_fires_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let timeouts = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let t = Arc::clone(&timeouts);
    let s = Arc::clone(&successes);
    let layer = TimeLimiterLayer::builder()
        .name("pricing")
        .timeout(Duration::from_millis(100))
        .on_timeout(move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        })
        .on_success(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let slow = layer.layer(service_fn(|_: CallContext| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, std::io::Error>(())
    }));
    let fast = layer.layer(service_fn(|_: CallContext| async { Ok::<_, std::io::Error>(()) }));

    let _ = slow.oneshot(CallContext::new("pricing")).await;
    let _ = fast.oneshot(CallContext::new("pricing")).await;
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}
