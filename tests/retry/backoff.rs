use super::Failure;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use svc_resilience_core::ErrorKind;
use svc_resilience_retry::{ExponentialBackoff, RetryLayer};
use tokio::time::Instant;
use tower::{service_fn, Layer, ServiceExt};

/// Runs an always-failing operation and returns the gaps between attempts.
async fn gaps(backoff: ExponentialBackoff, max_attempts: usize) -> Vec<Duration> {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&starts);
    let svc = RetryLayer::builder()
        .name("shipping")
        .max_attempts(max_attempts)
        .backoff(backoff)
        .build()
        .layer(service_fn(move |_: ()| {
            s.lock().unwrap().push(Instant::now());
            async { Err::<(), _>(Failure(ErrorKind::Connection)) }
        }));

    let _ = svc.oneshot(()).await;
    let starts = starts.lock().unwrap();
    starts.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn delays_double_without_jitter() {
    let backoff = ExponentialBackoff::new(Duration::from_millis(100)).jitter(0.0);
    assert_eq!(
        gaps(backoff, 4).await,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn delays_stop_growing_at_the_cap() {
    let backoff = ExponentialBackoff::new(Duration::from_millis(100))
        .multiplier(3.0)
        .max_interval(Duration::from_millis(500))
        .jitter(0.0);
    assert_eq!(
        gaps(backoff, 5).await,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(300),
            Duration::from_millis(500),
            Duration::from_millis(500),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn jittered_delays_stay_within_twenty_percent_and_cap() {
    let max = Duration::from_millis(1_000);
    let backoff = ExponentialBackoff::new(Duration::from_millis(200)).max_interval(max);

    for _ in 0..20 {
        let observed = gaps(backoff.clone(), 5).await;
        for (attempt, gap) in observed.iter().enumerate() {
            let base = backoff.base_interval(attempt);
            assert!(*gap >= base.mul_f64(0.8), "{gap:?} below {base:?} - 20%");
            // The paused clock wakes timers on whole milliseconds.
            let upper = base.mul_f64(1.2).min(max) + Duration::from_millis(1);
            assert!(*gap <= upper, "{gap:?} above {upper:?}");
        }
    }
}
