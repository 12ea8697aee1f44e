//! Client configuration.

use std::time::Duration;

use roomsync_core::SyncConfig;

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8081";

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default interval between confirmation sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, without a trailing slash
    pub base_url: String,
    /// Timeout applied to each unary call and to stream establishment
    pub request_timeout: Duration,
    /// How often the runtime ticks the manager
    pub sweep_interval: Duration,
    /// Sync engine settings
    pub sync: SyncConfig,
}

impl ClientConfig {
    /// Defaults with a different base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, ..Self::default() }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            sync: SyncConfig::default(),
        }
    }
}
