//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Rate limiting configuration.
///
/// Values are not checked here; `RateLimiter::new` rejects zeroes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of the fixed window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Requests accepted per key within one window
    #[serde(default = "default_max_events")]
    pub max_events: u32,

    /// Number of client keys tracked at once
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,

    /// Reaper tick in seconds; falls back to the window length
    #[serde(default)]
    pub reap_interval_secs: Option<u64>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_events: default_max_events(),
            max_keys: default_max_keys(),
            reap_interval_secs: None,
        }
    }
}

fn default_window_secs() -> u64 {
    300
}

fn default_max_events() -> u32 {
    5
}

fn default_max_keys() -> usize {
    1000
}

impl RateLimitingConfig {
    /// Get the window duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Get the reaper tick interval.
    pub fn reap_interval(&self) -> Duration {
        self.reap_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.window())
    }
}

impl GatekeeperConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse config: {}", e)))
    }
}
