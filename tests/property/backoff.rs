//! Property tests for exponential backoff.
//!
//! Invariants tested:
//! - Base delays never shrink and never exceed the cap
//! - Jittered delays stay within the jitter band and under the cap
//! - Without jitter the first delay is the initial interval

use proptest::prelude::*;
use std::time::Duration;
use svc_resilience_retry::ExponentialBackoff;

const EPSILON: Duration = Duration::from_micros(1);

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: base delays are monotonic and capped
    #[test]
    fn base_delays_grow_monotonically_up_to_the_cap(
        initial_ms in 1u64..=2_000,
        multiplier in 1.0f64..=4.0,
        max_ms in 1u64..=120_000,
    ) {
        let initial = Duration::from_millis(initial_ms.min(max_ms));
        let max = Duration::from_millis(max_ms);
        let backoff = ExponentialBackoff::new(initial)
            .multiplier(multiplier)
            .max_interval(max)
            .jitter(0.0);

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = backoff.base_interval(attempt);
            prop_assert!(delay + EPSILON >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            prop_assert!(delay <= max, "attempt {attempt}: {delay:?} exceeds {max:?}");
            prop_assert_eq!(backoff.next_interval(attempt), delay);
            previous = delay;
        }
    }

    /// Property: jitter stays within the configured fraction
    #[test]
    fn jitter_stays_in_band(
        initial_ms in 1u64..=2_000,
        jitter in 0.0f64..=1.0,
        attempt in 0usize..=12,
    ) {
        let max = Duration::from_secs(30);
        let backoff = ExponentialBackoff::new(Duration::from_millis(initial_ms))
            .max_interval(max)
            .jitter(jitter);

        let base = backoff.base_interval(attempt).as_secs_f64();
        let delay = backoff.next_interval(attempt);
        let low = Duration::from_secs_f64(base * (1.0 - jitter));
        let high = Duration::from_secs_f64(base * (1.0 + jitter)).min(max);

        prop_assert!(delay + EPSILON >= low, "{delay:?} below {low:?}");
        prop_assert!(delay <= high + EPSILON, "{delay:?} above {high:?}");
        prop_assert!(delay <= max);
    }

    /// Property: out-of-range settings are clamped, never rejected
    #[test]
    fn settings_are_clamped(
        multiplier in -10.0f64..=10.0,
        jitter in -2.0f64..=2.0,
    ) {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100))
            .multiplier(multiplier)
            .jitter(jitter);

        prop_assert!((0.0..=1.0).contains(&backoff.jitter_value()));
        prop_assert!(backoff.base_interval(1) >= backoff.base_interval(0));
    }
}
