use std::time::Duration;
use tokio::time::Instant;

const MULTIPLIER: f64 = 1.5;

/// Exponential delay between failed auth attempts.
///
/// The delay grows by 1.5x from `initial` up to `max`. Once `max_elapsed` has
/// passed since the last reset the delay is pinned at `max`; it never stops
/// producing delays.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    max_elapsed: Duration,
    current: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, max_elapsed: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            max_elapsed,
            current: initial,
            started: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.started = Instant::now();
    }

    pub fn next_delay(&mut self) -> Duration {
        if !self.max_elapsed.is_zero() && self.started.elapsed() >= self.max_elapsed {
            return self.max;
        }

        let delay = self.current;
        self.current = self.current.mul_f64(MULTIPLIER).min(self.max);
        delay
    }
}
