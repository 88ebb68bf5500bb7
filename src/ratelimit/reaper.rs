//! Background reclamation of idle counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::store::LimiterStore;

/// Periodically removes counters that have been idle longer than the window.
///
/// Eviction on insert only bounds the store by capacity; the reaper frees
/// slots held by clients that went away even when capacity is never reached.
pub struct Reaper {
    store: Arc<LimiterStore>,
    interval: Duration,
}

impl Reaper {
    pub fn new(store: Arc<LimiterStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run one pass as of `now`, returning the number of keys removed.
    pub fn scan_once(&self, now: DateTime<Utc>) -> usize {
        self.store.reap(now)
    }

    /// Scan on every tick until `cancel` fires.
    ///
    /// The first scan happens one full interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "Reaper started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = self.scan_once(Utc::now());
                    debug!(removed, tracked = self.store.len(), "Reaper pass complete");
                }
            }
        }
    }
}
