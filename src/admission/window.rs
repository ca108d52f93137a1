//! Per-subject sliding window of recent request times

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Shortest span a full window is measured over. Keeps the estimate finite
/// when several requests share one timestamp.
fn min_span() -> Duration {
    Duration::milliseconds(1)
}

/// Fixed-capacity FIFO of the last `precision` request timestamps plus the
/// subject's penalty state
#[derive(Debug, Clone)]
pub struct RateWindow {
    /// Maximum number of timestamps retained
    capacity: usize,
    /// Timestamps in arrival order, oldest first
    samples: VecDeque<DateTime<Utc>>,
    /// Most recent request
    last_seen: DateTime<Utc>,
    /// Requests are refused until this time. `None` if never penalised.
    penalty_until: Option<DateTime<Utc>>,
}

impl RateWindow {
    pub fn new(capacity: usize, now: DateTime<Utc>) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            last_seen: now,
            penalty_until: None,
        }
    }

    /// Record a request at `now`
    ///
    /// Once the window is full, returns the estimated rate in requests per
    /// second: `capacity` requests over the span from the oldest retained
    /// sample to `now`. The oldest sample is evicted in the same step.
    pub fn record(&mut self, now: DateTime<Utc>) -> Option<f64> {
        self.samples.push_back(now);
        self.last_seen = now;

        if self.samples.len() < self.capacity {
            return None;
        }

        // Remove oldest; the window now holds capacity - 1 samples
        let oldest = self.samples.pop_front()?;
        let span = (now - oldest).max(min_span());
        let seconds = span.num_nanoseconds().map_or(span.num_seconds() as f64, |ns| ns as f64 / 1e9);

        Some(self.capacity as f64 / seconds)
    }

    /// Push the penalty forward by `by`, starting from `now` or the current
    /// penalty, whichever is later
    pub fn extend_penalty(&mut self, now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
        let base = self.penalty_until.map_or(now, |until| until.max(now));
        let until = base.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.penalty_until = Some(until);
        until
    }

    pub fn penalty_until(&self) -> Option<DateTime<Utc>> {
        self.penalty_until
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Whether a penalty is still running at `now`
    pub fn penalised(&self, now: DateTime<Utc>) -> bool {
        self.penalty_until.is_some_and(|until| until > now)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_fills_before_estimating() {
        let t0 = Utc::now();
        let mut window = RateWindow::new(3, t0);
        assert!(window.is_empty());

        assert_eq!(window.record(t0), None);
        assert!(!window.is_empty());
        assert_eq!(window.record(t0 + Duration::milliseconds(100)), None);
        let rate = window.record(t0 + Duration::milliseconds(200)).unwrap();

        assert!((rate - 15.0).abs() < 1e-9);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_window_slides() {
        let t0 = Utc::now();
        let mut window = RateWindow::new(3, t0);

        for i in 0..3 {
            window.record(t0 + Duration::seconds(i));
        }
        // Samples now at 1s, 2s; next request at 4s spans 1s..4s
        let rate = window.record(t0 + Duration::seconds(4)).unwrap();
        assert!((rate - 1.0).abs() < 1e-9);
        assert_eq!(window.last_seen(), t0 + Duration::seconds(4));
    }

    #[test]
    fn test_identical_timestamps_stay_finite() {
        let t0 = Utc::now();
        let mut window = RateWindow::new(3, t0);

        window.record(t0);
        window.record(t0);
        let rate = window.record(t0).unwrap();

        assert!(rate.is_finite());
        assert!((rate - 3000.0).abs() < 1e-6);
    }

    #[test]
    fn test_penalty_extends_from_later_of_now_and_current() {
        let t0 = Utc::now();
        let mut window = RateWindow::new(3, t0);
        assert!(!window.penalised(t0));

        let first = window.extend_penalty(t0, Duration::minutes(5));
        assert_eq!(first, t0 + Duration::minutes(5));

        // Still penalised: stacks on top of the running penalty
        let second = window.extend_penalty(t0 + Duration::minutes(1), Duration::minutes(5));
        assert_eq!(second, t0 + Duration::minutes(10));

        // Elapsed penalty: starts again from now
        let later = t0 + Duration::hours(1);
        let third = window.extend_penalty(later, Duration::minutes(2));
        assert_eq!(third, later + Duration::minutes(2));
        assert!(window.penalised(later));
        assert!(!window.penalised(third));
    }
}
