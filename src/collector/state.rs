use tokio::time::Instant;

/// Cumulative totals below this value are treated as "nothing consumed yet".
pub const MIN_CUMULATIVE_VALUE: f64 = 0.1;

/// Previous sample of a cumulative counter, used to derive a per-second rate.
///
/// Owned by exactly one collector task and never shared.
#[derive(Debug, Default)]
pub struct CollectorState {
    last: Option<(f64, Instant)>,
}

impl CollectorState {
    /// Records `current` as the new baseline and returns the rate of change per second
    /// since the previous call.
    ///
    /// Returns `0.0` when there is no previous sample, when `current` is below
    /// [`MIN_CUMULATIVE_VALUE`], when no time has elapsed, and when the counter went
    /// backwards (e.g., the cgroup was recreated).
    pub fn rate(&mut self, current: f64, now: Instant) -> f64 {
        let previous = self.last.replace((current, now));
        if current < MIN_CUMULATIVE_VALUE {
            return 0.0;
        }
        let Some((last_value, last_time)) = previous else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(last_time).as_secs_f64();
        let delta = current - last_value;
        if elapsed <= 0.0 || delta < 0.0 {
            return 0.0;
        }
        delta / elapsed
    }

    pub fn has_baseline(&self) -> bool {
        self.last.is_some()
    }
}
