//! Admission control
//!
//! Each subject's request rate is estimated from a sliding window of its last
//! `precision` request times. A subject that exceeds its declared budget earns
//! a cooldown proportional to the overshoot, and keeps extending it for as
//! long as it keeps hammering.
//!
//! Windows are created lazily on first request and only ever removed by the
//! sweep, once the subject has been idle long enough and any penalty is over.

mod window;

pub use window::RateWindow;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::{AdmissionConfig, ConfigError};
use crate::subject::SubjectKey;
use crate::sweep::Sweep;

/// Per-subject rate estimator with escalating penalties
#[derive(Debug)]
pub struct AdmissionController {
    windows: DashMap<SubjectKey, RateWindow>,
    precision: usize,
    penalty_factor: f64,
    idle_window: Duration,
}

impl AdmissionController {
    /// Build a controller; fails if `config` is out of range
    pub fn new(config: &AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            windows: DashMap::new(),
            precision: config.precision,
            penalty_factor: config.penalty_factor,
            idle_window: config.idle_window(),
        })
    }

    /// Record a request and return the subject's penalty deadline
    ///
    /// The returned time may already be in the past, meaning no active
    /// penalty; `None` means the subject has never been penalised. A
    /// non-positive budget disables throttling for the call.
    pub fn admit(
        &self,
        tenant_type: &str,
        subject_id: &str,
        rate_budget: f64,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let key = SubjectKey::new(tenant_type, subject_id);
        // The entry guard holds the shard lock, so one subject's window is
        // updated by one request at a time
        let mut window = self
            .windows
            .entry(key)
            .or_insert_with(|| RateWindow::new(self.precision, now));

        let rate = window.record(now);

        if let Some(rate) = rate {
            if rate_budget.is_finite() && rate_budget > 0.0 && rate > rate_budget {
                let by = self.penalty_for(rate, rate_budget);
                let until = window.extend_penalty(now, by);
                debug!(
                    tenant = tenant_type,
                    subject = subject_id,
                    rate,
                    budget = rate_budget,
                    until = %until,
                    "Rate budget exceeded"
                );
            }
        }

        window.penalty_until()
    }

    /// Whether a penalty returned by [`admit`](Self::admit) refuses the request at `now`
    pub fn is_throttled(penalty_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        penalty_until.is_some_and(|until| until > now)
    }

    /// `penalty_factor * rate / budget` minutes
    fn penalty_for(&self, rate: f64, rate_budget: f64) -> Duration {
        let minutes = self.penalty_factor * rate / rate_budget;
        // f64 -> i64 casts saturate; stay well inside chrono's range
        let millis = (minutes * 60_000.0).clamp(0.0, (i64::MAX / 4) as f64) as i64;
        Duration::milliseconds(millis)
    }

    pub fn penalty_until(&self, key: &SubjectKey) -> Option<DateTime<Utc>> {
        self.windows.get(key).and_then(|w| w.penalty_until())
    }

    /// Whether the subject currently has a window
    pub fn tracked(&self, key: &SubjectKey) -> bool {
        self.windows.contains_key(key)
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Forget every subject
    pub fn reset(&self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Sweep for AdmissionController {
    fn name(&self) -> &'static str {
        "admission"
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Some(horizon) = now.checked_sub_signed(self.idle_window) else {
            return 0;
        };

        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.last_seen() >= horizon || window.penalised(now));
        let removed = before.saturating_sub(self.windows.len());

        if removed > 0 {
            debug!(removed, remaining = self.windows.len(), "Dropped idle rate windows");
        }
        removed
    }
}
