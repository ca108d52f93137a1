//! Periodic sweeps
//!
//! The revocation registry and the admission controller both shed stale
//! entries on a fixed interval. [`SweepTask`] owns that background loop with
//! an explicit start/stop lifecycle; [`SweepTask::run_once`] performs a single
//! pass so tests never have to sleep for one.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;

/// State that can drop its own stale entries
pub trait Sweep: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Drop stale entries as of `now`, returning how many were removed
    fn sweep(&self, now: DateTime<Utc>) -> usize;
}

/// A running periodic sweep
pub struct SweepTask {
    name: &'static str,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SweepTask {
    /// Spawn a loop sweeping `target` every `period`
    ///
    /// The first pass runs one full period after start. Must be called from
    /// within a tokio runtime.
    pub fn start(target: Arc<dyn Sweep>, period: Duration, clock: Arc<dyn Clock>) -> Self {
        let name = target.name();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        Self::run_once(target.as_ref(), clock.as_ref());
                    }
                }
            }
            debug!(sweep = name, "Sweep loop exited");
        });

        info!(sweep = name, period_secs = period.as_secs(), "Sweep task started");

        Self {
            name,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Run one sweep pass at the clock's current time
    pub fn run_once(target: &dyn Sweep, clock: &dyn Clock) -> usize {
        let removed = target.sweep(clock.now());
        if removed > 0 {
            debug!(sweep = target.name(), removed, "Sweep pass removed entries");
        }
        removed
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!(sweep = self.name, "Sweep task stopped");
    }
}

impl Drop for SweepTask {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
