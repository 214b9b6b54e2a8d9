//! Time limiter metrics regression tests

use super::helpers::*;
use serial_test::serial;
use std::time::Duration;
use svc_resilience_core::CallContext;
use svc_resilience_timelimiter::TimeLimiterLayer;
use tower::{Layer, ServiceExt};

#[tokio::test(start_paused = true)]
#[serial]
async fn timelimiter_metrics_exist() {
    init_recorder();

    let layer = TimeLimiterLayer::builder()
        .name("test_tl")
        .timeout(Duration::from_millis(100))
        .build();

    let fast = layer.layer(tower::service_fn(|_: CallContext| async {
        Ok::<_, std::io::Error>(())
    }));
    let _ = fast.oneshot(CallContext::new("test_tl")).await;

    let slow = layer.layer(tower::service_fn(|_: CallContext| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, std::io::Error>(())
    }));
    let _ = slow.oneshot(CallContext::new("test_tl")).await;

    assert_counter_exists("timelimiter_calls_total");
    assert_metric_has_label("timelimiter_calls_total", "timelimiter", "test_tl");
    assert_metric_has_label("timelimiter_calls_total", "result", "success");
    assert_metric_has_label("timelimiter_calls_total", "result", "timeout");

    assert_histogram_exists("timelimiter_call_duration_seconds");
    assert_metric_has_label("timelimiter_call_duration_seconds", "timelimiter", "test_tl");
}
