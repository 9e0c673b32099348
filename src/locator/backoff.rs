use std::time::Duration;

use rand::Rng;

/// Exponentially growing retry delays with optional jitter and no overall deadline.
///
/// Each call to [`next_delay`](Self::next_delay) returns the current interval
/// (randomized by `± randomization_factor`) and then multiplies the interval by
/// `multiplier`, capped at `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max_interval: Duration,
    randomization_factor: f64,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(
        initial: Duration,
        multiplier: f64,
        max_interval: Duration,
        randomization_factor: f64,
    ) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            initial,
            multiplier: multiplier.max(1.0),
            max_interval: max_interval.max(initial),
            randomization_factor: randomization_factor.clamp(0.0, 1.0),
            current: initial,
        }
    }

    /// Returns the delay before the next retry and advances the interval.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.randomize(self.current);
        self.current = self
            .current
            .mul_f64(self.multiplier)
            .min(self.max_interval);
        delay
    }

    /// Restores the initial interval.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    fn randomize(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }
        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        Duration::from_secs_f64(rand::thread_rng().gen_range((secs - delta)..=(secs + delta)))
    }
}

impl Default for ExponentialBackoff {
    /// 500ms initial interval growing by 1.5x up to one minute, with 50% jitter.
    fn default() -> Self {
        Self::new(
            Duration::from_millis(500),
            1.5,
            Duration::from_secs(60),
            0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_until_capped() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(5),
            0.0,
        );
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(10),
            1.0,
            Duration::from_secs(10),
            0.5,
        );
        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(5) && delay <= Duration::from_secs(15));
        }
    }
}
