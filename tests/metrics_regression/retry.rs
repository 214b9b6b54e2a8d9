//! Retry metrics regression tests

use super::helpers::*;
use serial_test::serial;
use std::time::Duration;
use svc_resilience_retry::RetryLayer;
use tower::{Layer, ServiceExt};

#[tokio::test(start_paused = true)]
#[serial]
async fn retry_metrics_exist() {
    init_recorder();

    let layer = RetryLayer::builder()
        .name("test_retry")
        .max_attempts(3)
        .exponential_backoff(Duration::from_millis(10))
        .build();
    let svc = layer.layer(tower::service_fn(|_: ()| async {
        Err::<(), _>(refused())
    }));

    let _ = svc.oneshot(()).await;

    assert_counter_exists("retry_attempts_total");
    assert_metric_has_label("retry_attempts_total", "retry", "test_retry");
    assert_counter_exists("retry_exhausted_total");
    assert_metric_has_label("retry_exhausted_total", "retry", "test_retry");
}
