//! Capacity-bounded map of per-key window counters.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::counter::{Recency, WindowCounter};
use crate::error::{GatekeeperError, Result};

/// Counters plus an index of keys ordered by recency.
///
/// Both halves always describe the same set of keys.
#[derive(Debug, Default)]
struct Entries {
    counters: HashMap<String, WindowCounter>,
    by_recency: BTreeMap<Recency, String>,
    next_seq: u64,
}

impl Entries {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.by_recency.pop_first()?;
        self.counters.remove(&key);
        Some(key)
    }
}

/// Fixed-window rate limit state for up to `max_keys` clients.
///
/// Every read and write goes through a single mutex, so each admission check
/// is atomic with respect to other checks and to reaping.
#[derive(Debug)]
pub struct LimiterStore {
    window: TimeDelta,
    max_events: u32,
    max_keys: usize,
    entries: Mutex<Entries>,
}

impl LimiterStore {
    /// Create an empty store.
    ///
    /// Fails unless the window is positive and both limits are non-zero.
    pub fn new(window: TimeDelta, max_events: u32, max_keys: usize) -> Result<Self> {
        if window <= TimeDelta::zero() {
            return Err(GatekeeperError::Config(
                "window must be positive".to_string(),
            ));
        }
        if max_events == 0 {
            return Err(GatekeeperError::Config(
                "max_events must be positive".to_string(),
            ));
        }
        if max_keys == 0 {
            return Err(GatekeeperError::Config(
                "max_keys must be positive".to_string(),
            ));
        }

        Ok(Self {
            window,
            max_events,
            max_keys,
            entries: Mutex::new(Entries::default()),
        })
    }

    /// Decide whether a request for `key` at `now` may proceed.
    ///
    /// The check is recorded even when it is rejected. A key seen for the
    /// first time while the store is full replaces the least recently seen
    /// key.
    pub fn is_allowed(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.entries.lock();
        let seq = entries.next_seq();

        if !entries.counters.contains_key(key) && entries.counters.len() >= self.max_keys {
            if let Some(evicted) = entries.evict_oldest() {
                debug!(
                    evicted = %evicted,
                    key = %key,
                    "Store at capacity, evicted least recently seen key"
                );
            }
        }

        let Entries {
            counters,
            by_recency,
            ..
        } = &mut *entries;

        let (allowed, count) = match counters.get_mut(key) {
            Some(counter) => {
                by_recency.remove(&counter.recency());
                if counter.window_elapsed(now, self.window) {
                    trace!(key = %key, "Window elapsed, resetting counter");
                    counter.reset_window(now);
                }
                counter.touch(now, seq);
                by_recency.insert(counter.recency(), key.to_string());

                (counter.try_acquire(self.max_events), counter.count())
            }
            None => {
                let mut counter = WindowCounter::new(now, seq);
                let allowed = counter.try_acquire(self.max_events);
                let count = counter.count();
                by_recency.insert(counter.recency(), key.to_string());
                counters.insert(key.to_string(), counter);

                (allowed, count)
            }
        };

        trace!(key = %key, count, allowed, "Checked rate limit");
        allowed
    }

    /// Drop every counter idle for longer than the window as of `now`.
    ///
    /// Returns the number of keys removed.
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let mut removed = 0;

        while let Some((recency, _)) = entries.by_recency.first_key_value() {
            if now.signed_duration_since(recency.last_seen) <= self.window {
                break;
            }
            if entries.evict_oldest().is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(
                removed,
                remaining = entries.counters.len(),
                "Reaped idle rate limit counters"
            );
        }
        removed
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` has a counter.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().counters.contains_key(key)
    }

    /// Events accepted for `key` in its current window, if tracked.
    pub fn count(&self, key: &str) -> Option<u32> {
        self.entries.lock().counters.get(key).map(WindowCounter::count)
    }

    /// Clear all counters.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.counters.clear();
        entries.by_recency.clear();
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn max_events(&self) -> u32 {
        self.max_events
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Whether the counters and the recency index agree.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let entries = self.entries.lock();
        entries.counters.len() == entries.by_recency.len()
            && entries.by_recency.iter().all(|(recency, key)| {
                entries
                    .counters
                    .get(key)
                    .is_some_and(|counter| counter.recency() == *recency)
            })
    }
}
