//! Rate limiter facade wiring configuration into a store and its reaper.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RateLimitingConfig;
use crate::error::{GatekeeperError, Result};

use super::backend::AdmissionControl;
use super::reaper::Reaper;
use super::store::LimiterStore;

/// Per-client fixed window rate limiter.
///
/// This struct is thread-safe and can be shared across multiple tasks.
/// `run` drives idle reclamation and should be spawned once.
pub struct RateLimiter {
    store: Arc<LimiterStore>,
    reaper: Reaper,
}

impl RateLimiter {
    /// Create a rate limiter from configuration.
    ///
    /// Fails if the window, the event limit, the key limit or an explicit
    /// reap interval is zero.
    pub fn new(config: &RateLimitingConfig) -> Result<Self> {
        if config.reap_interval_secs == Some(0) {
            return Err(GatekeeperError::Config(
                "reap_interval_secs must be positive".to_string(),
            ));
        }

        let window = TimeDelta::from_std(config.window()).map_err(|e| {
            GatekeeperError::Config(format!("window_secs out of range: {}", e))
        })?;

        let store = Arc::new(LimiterStore::new(
            window,
            config.max_events,
            config.max_keys,
        )?);
        let reaper = Reaper::new(store.clone(), config.reap_interval());

        debug!(
            window_secs = config.window_secs,
            max_events = config.max_events,
            max_keys = config.max_keys,
            "Rate limiter created"
        );

        Ok(Self { store, reaper })
    }

    /// Decide whether a request for `key` at `now` may proceed.
    pub fn is_allowed(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.store.is_allowed(key, now)
    }

    /// Reap idle counters until `cancel` fires.
    ///
    /// Cancellation is the normal way out and is not reported as an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.reaper.run(cancel).await;
        info!("Rate limiter stopped");
        Ok(())
    }

    /// Get the number of tracked client keys.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    pub fn store(&self) -> &Arc<LimiterStore> {
        &self.store
    }
}

impl AdmissionControl for RateLimiter {
    fn is_allowed(&self, key: &str, now: DateTime<Utc>) -> bool {
        RateLimiter::is_allowed(self, key, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn config(window_secs: u64, max_events: u32, max_keys: usize) -> RateLimitingConfig {
        RateLimitingConfig {
            window_secs,
            max_events,
            max_keys,
            reap_interval_secs: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_rejects_zero_values() {
        for bad in [config(0, 5, 1000), config(300, 0, 1000), config(300, 5, 0)] {
            let result = RateLimiter::new(&bad);
            assert!(matches!(result, Err(GatekeeperError::Config(_))));
        }

        let mut bad = config(300, 5, 1000);
        bad.reap_interval_secs = Some(0);
        assert!(matches!(
            RateLimiter::new(&bad),
            Err(GatekeeperError::Config(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        let limiter = RateLimiter::new(&RateLimitingConfig::default()).unwrap();
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.store().window(), TimeDelta::minutes(5));
    }

    #[test]
    fn test_five_per_window_scenario() {
        let limiter = RateLimiter::new(&config(300, 5, 1000)).unwrap();
        let key = "1.2.3.4";

        for i in 0..5 {
            assert!(
                limiter.is_allowed(key, t0() + TimeDelta::seconds(i * 15)),
                "Request {} should be allowed",
                i + 1
            );
        }
        assert!(!limiter.is_allowed(key, t0() + TimeDelta::minutes(2)));

        // Window elapsed
        assert!(limiter.is_allowed(key, t0() + TimeDelta::minutes(5) + TimeDelta::seconds(1)));
        assert_eq!(limiter.store().count(key), Some(1));
    }

    #[test]
    fn test_capacity_scenario() {
        let limiter = RateLimiter::new(&config(300, 5, 2)).unwrap();

        limiter.is_allowed("A", t0());
        limiter.is_allowed("B", t0() + TimeDelta::seconds(1));
        limiter.is_allowed("A", t0() + TimeDelta::seconds(2));
        limiter.is_allowed("B", t0() + TimeDelta::seconds(2));
        assert!(limiter.is_allowed("C", t0() + TimeDelta::seconds(3)));

        assert_eq!(limiter.tracked_keys(), 2);
        assert!(!limiter.store().contains("A"));
        assert!(limiter.store().contains("B"));
    }

    #[test]
    fn test_idle_key_treated_as_new_after_reap() {
        let limiter = RateLimiter::new(&config(300, 1, 1000)).unwrap();

        assert!(limiter.is_allowed("D", t0()));
        assert!(!limiter.is_allowed("D", t0()));

        let later = t0() + TimeDelta::seconds(301);
        assert_eq!(limiter.store().reap(later), 1);
        assert!(!limiter.store().contains("D"));
        assert!(limiter.is_allowed("D", later));
    }

    #[tokio::test]
    async fn test_run_returns_ok_on_cancel() {
        let limiter = Arc::new(RateLimiter::new(&config(300, 5, 1000)).unwrap());
        let cancel = CancellationToken::new();

        let handle = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.run(cancel).await })
        };

        // Admission checks keep working while the reaper runs
        assert!(limiter.is_allowed("k", Utc::now()));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run should return promptly")
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_admission_control_trait_delegates() {
        let limiter = RateLimiter::new(&config(300, 1, 1000)).unwrap();
        let control: &dyn AdmissionControl = &limiter;

        assert!(control.is_allowed("k", t0()));
        assert!(!control.is_allowed("k", t0()));
    }
}
