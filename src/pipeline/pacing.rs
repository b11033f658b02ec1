use std::time::{Duration, Instant};

/// Fixed-cadence deadline tracker.
///
/// Deadlines accumulate from the start instant instead of being measured
/// from the previous wake-up, so processing jitter does not drift the rate.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_deadline: Instant,
}

impl Pacer {
    /// Pace at `fps`. Rates with no representable interval (zero, negative,
    /// non-finite or vanishingly small) fall back to 1 fps.
    pub fn new(fps: f64, start: Instant) -> Self {
        let interval = Some(fps)
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .and_then(|fps| Duration::try_from_secs_f64(1.0 / fps).ok())
            .unwrap_or(Duration::from_secs(1));
        Self {
            interval,
            next_deadline: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Move to the next deadline. Returns how long to wait for it, or `None`
    /// when it has already passed.
    pub fn advance(&mut self, now: Instant) -> Option<Duration> {
        self.next_deadline += self.interval;
        self.next_deadline
            .checked_duration_since(now)
            .filter(|wait| !wait.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn unknown_rates_fall_back_to_one_per_second() {
        let now = Instant::now();
        assert_eq!(Pacer::new(0.0, now).interval(), Duration::from_secs(1));
        assert_eq!(Pacer::new(f64::NAN, now).interval(), Duration::from_secs(1));
        assert_eq!(Pacer::new(-5.0, now).interval(), Duration::from_secs(1));
        assert_eq!(Pacer::new(1e-30, now).interval(), Duration::from_secs(1));
        assert_eq!(Pacer::new(10.0, now).interval(), 100 * MS);
    }

    #[test]
    fn deadlines_accumulate_and_never_go_negative() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(10.0, t0);

        // Read took 30ms: wait out the rest of the first slot
        assert_eq!(pacer.advance(t0 + 30 * MS), Some(70 * MS));
        // A stall past the second deadline: no wait at all
        assert_eq!(pacer.advance(t0 + 250 * MS), None);
        // Back on the start-aligned grid, catching up
        assert_eq!(pacer.advance(t0 + 260 * MS), Some(40 * MS));
        assert_eq!(pacer.advance(t0 + 300 * MS), Some(100 * MS));
    }

    #[test]
    fn exact_deadline_hit_does_not_sleep() {
        let t0 = Instant::now();
        let mut pacer = Pacer::new(10.0, t0);
        assert_eq!(pacer.advance(t0 + 100 * MS), None);
    }
}
