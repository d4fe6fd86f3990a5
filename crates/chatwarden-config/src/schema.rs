//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Profile and directory settings
    #[serde(default)]
    pub app: RawAppConfig,

    /// Premium subscription settings
    #[serde(default)]
    pub premium: RawPremiumConfig,

    /// Liveness watchdog settings
    #[serde(default)]
    pub watchdog: RawWatchdogConfig,

    /// Purchase backend selection
    #[serde(default)]
    pub entitlement: RawEntitlementConfig,
}

/// Application-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAppConfig {
    /// Profile name (default: "default")
    pub profile: Option<String>,

    /// Data directory holding per-profile state
    pub data_dir: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPremiumConfig {
    /// Days granted by one subscription purchase
    pub duration_days: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawWatchdogConfig {
    /// Seconds without a heartbeat before the app counts as hung
    pub timeout_seconds: Option<u64>,

    /// How often the monitor checks the last heartbeat
    pub check_interval_seconds: Option<u64>,

    /// How often the host sends heartbeats
    pub heartbeat_interval_seconds: Option<u64>,

    /// Consecutive timeouts before a soft warning
    pub warn_after: Option<u32>,

    /// Consecutive timeouts before offering a restart
    pub restart_after: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEntitlementConfig {
    /// Backend: "mock" or "store"
    pub backend: Option<String>,

    /// Base URL of the storefront service (required for "store")
    pub store_url: Option<String>,

    /// Per-request timeout for the storefront service
    pub request_timeout_seconds: Option<u64>,
}
