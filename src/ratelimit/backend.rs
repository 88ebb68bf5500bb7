//! Admission control trait for abstracting the limiter behind HTTP plumbing.

use chrono::{DateTime, Utc};

/// Trait for anything that can allow or reject a request for a client key.
///
/// The HTTP middleware depends on this rather than on `RateLimiter` directly.
pub trait AdmissionControl: Send + Sync {
    /// Decide whether a request for `key` at `now` may proceed.
    fn is_allowed(&self, key: &str, now: DateTime<Utc>) -> bool;
}
