use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a cap and symmetric random jitter.
///
/// The delay before retry `attempt` (0-indexed) is
/// `min(initial * multiplier^attempt, max)`, then scaled by a random factor in
/// `[1 - jitter, 1 + jitter]` and capped at `max` again. Jitter spreads
/// retries from many replicas that failed at the same moment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Creates a backoff with multiplier 2.0, a 60 second cap and 20% jitter.
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            jitter: 0.2,
        }
    }

    /// Sets the multiplier for exponential growth. Values below 1.0 are
    /// raised to 1.0.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the maximum interval.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`. Zero disables it.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// First delay.
    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Delay cap.
    pub fn max_interval_value(&self) -> Duration {
        self.max_interval
    }

    /// Jitter fraction.
    pub fn jitter_value(&self) -> f64 {
        self.jitter
    }

    /// The capped delay before retry `attempt`, without jitter.
    pub fn base_interval(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let secs = self.initial_interval.as_secs_f64() * factor;
        let max = self.max_interval.as_secs_f64();

        if !secs.is_finite() || secs >= max {
            self.max_interval
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// The delay before retry `attempt`, with jitter applied.
    pub fn next_interval(&self, attempt: usize) -> Duration {
        let base = self.base_interval(attempt);
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        self.randomize(base)
    }

    fn randomize(&self, duration: Duration) -> Duration {
        let secs = duration.as_secs_f64();
        let delta = secs * self.jitter;
        let randomized = rand::rng().random_range((secs - delta)..=(secs + delta));
        Duration::try_from_secs_f64(randomized.max(0.0))
            .map_or(self.max_interval, |d| d.min(self.max_interval))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
