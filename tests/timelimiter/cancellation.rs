use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svc_resilience_core::CallContext;
use svc_resilience_timelimiter::TimeLimiterLayer;
use tower::{service_fn, Layer, ServiceExt};

#[tokio::test(start_paused = true)]
async fn operation_sees_cancellation_and_stops_background_work() {
    let abandoned = Arc::new(AtomicBool::new(false));
    let a = Arc::clone(&abandoned);
    let layer = TimeLimiterLayer::builder()
        .name("pricing")
        .timeout(Duration::from_millis(200))
        .build();

    let svc = layer.layer(service_fn(move |ctx: CallContext| {
        let a = Arc::clone(&a);
        async move {
            let token = ctx.cancellation().clone();
            let background = tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => a.store(true, Ordering::SeqCst),
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                }
            });
            background.await.ok();
            Ok::<_, std::io::Error>(())
        }
    }));

    let err = svc.oneshot(CallContext::new("pricing")).await.unwrap_err();
    assert!(err.is_timeout());
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(abandoned.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_call_cancels_the_operation() {
    let layer = TimeLimiterLayer::builder()
        .name("pricing")
        .timeout(Duration::from_secs(30))
        .build();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let s = Arc::clone(&seen);

    let svc = layer.layer(service_fn(move |ctx: CallContext| {
        *s.lock().unwrap() = Some(ctx.cancellation().clone());
        async {
            std::future::pending::<()>().await;
            Ok::<_, std::io::Error>(())
        }
    }));

    let call = svc.oneshot(CallContext::new("pricing"));
    let _ = tokio::time::timeout(Duration::from_millis(10), call).await;

    let token = seen.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
}
