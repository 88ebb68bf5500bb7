//! Per-key fixed window counter.

use chrono::{DateTime, TimeDelta, Utc};

/// Position of a counter in the store's least-recently-seen order.
///
/// `seq` breaks ties between equal `last_seen` instants: the key that was
/// touched first sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Recency {
    pub(crate) last_seen: DateTime<Utc>,
    pub(crate) seq: u64,
}

/// Accepted events for one key within the current fixed window.
///
/// This type has no synchronization of its own; it is only ever mutated
/// under the owning store's lock.
#[derive(Debug, Clone)]
pub struct WindowCounter {
    /// Start of the current window
    window_start: DateTime<Utc>,
    /// Events accepted since `window_start`
    count: u32,
    /// Last admission check, accepted or not
    recency: Recency,
}

impl WindowCounter {
    /// Create a counter whose window opens at `now`.
    pub fn new(now: DateTime<Utc>, seq: u64) -> Self {
        Self {
            window_start: now,
            count: 0,
            recency: Recency { last_seen: now, seq },
        }
    }

    /// Whether at least `window` has passed since the window opened.
    ///
    /// A `now` earlier than the window start never counts as elapsed.
    pub fn window_elapsed(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        now.signed_duration_since(self.window_start) >= window
    }

    /// Open a fresh window at `now`.
    pub fn reset_window(&mut self, now: DateTime<Utc>) {
        self.window_start = now;
        self.count = 0;
    }

    /// Record an admission check.
    pub fn touch(&mut self, now: DateTime<Utc>, seq: u64) {
        self.recency = Recency { last_seen: now, seq };
    }

    /// Take one slot if the window still has room.
    ///
    /// Returns `false` and leaves the count untouched once `max_events` is
    /// reached.
    pub fn try_acquire(&mut self, max_events: u32) -> bool {
        if self.count < max_events {
            self.count += 1;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.recency.last_seen
    }

    pub(crate) fn recency(&self) -> Recency {
        self.recency
    }
}
