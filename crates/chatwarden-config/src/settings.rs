//! Validated settings structures

use crate::schema::{RawAppConfig, RawConfig, RawEntitlementConfig, RawWatchdogConfig};
use crate::validation::parse_backend;
use chatwarden_util::{default_data_dir, default_log_dir, ProfileId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PREMIUM_DAYS: u32 = 30;
pub const DEFAULT_WATCHDOG_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_WARN_AFTER: u32 = 1;
pub const DEFAULT_RESTART_AFTER: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Validated settings ready for use by the host
#[derive(Debug, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub premium: PremiumSettings,
    pub watchdog: WatchdogSettings,
    pub entitlement: EntitlementSettings,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            app: AppSettings::from_raw(raw.app),
            premium: PremiumSettings {
                duration_days: raw.premium.duration_days.unwrap_or(DEFAULT_PREMIUM_DAYS),
            },
            watchdog: WatchdogSettings::from_raw(raw.watchdog),
            entitlement: EntitlementSettings::from_raw(raw.entitlement),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_raw(RawConfig {
            config_version: crate::CURRENT_CONFIG_VERSION,
            app: Default::default(),
            premium: Default::default(),
            watchdog: Default::default(),
            entitlement: Default::default(),
        })
    }
}

/// Profile and directory settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub profile: ProfileId,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl AppSettings {
    fn from_raw(raw: RawAppConfig) -> Self {
        Self {
            // Validation has already rejected bad names
            profile: raw
                .profile
                .and_then(|p| ProfileId::new(p).ok())
                .unwrap_or_default(),
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_dir: raw.log_dir.unwrap_or_else(default_log_dir),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PremiumSettings {
    pub duration_days: u32,
}

/// Watchdog timing and the host's escalation thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub timeout: Duration,
    pub check_interval: Duration,
    pub heartbeat_interval: Duration,
    pub warn_after: u32,
    pub restart_after: u32,
}

impl WatchdogSettings {
    fn from_raw(raw: RawWatchdogConfig) -> Self {
        Self {
            timeout: Duration::from_secs(
                raw.timeout_seconds.unwrap_or(DEFAULT_WATCHDOG_TIMEOUT_SECS),
            ),
            check_interval: Duration::from_secs(
                raw.check_interval_seconds
                    .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
            ),
            heartbeat_interval: Duration::from_secs(
                raw.heartbeat_interval_seconds
                    .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            ),
            warn_after: raw.warn_after.unwrap_or(DEFAULT_WARN_AFTER),
            restart_after: raw.restart_after.unwrap_or(DEFAULT_RESTART_AFTER),
        }
    }
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self::from_raw(RawWatchdogConfig::default())
    }
}

/// Which purchase backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local development backend, no payment
    Mock,
    /// Remote storefront service
    Store,
}

#[derive(Debug, Clone)]
pub struct EntitlementSettings {
    pub backend: BackendKind,
    pub store_url: Option<String>,
    pub request_timeout: Duration,
}

impl EntitlementSettings {
    fn from_raw(raw: RawEntitlementConfig) -> Self {
        Self {
            backend: raw
                .backend
                .as_deref()
                .and_then(|b| parse_backend(b).ok())
                .unwrap_or(BackendKind::Mock),
            store_url: raw.store_url.filter(|u| !u.is_empty()),
            request_timeout: Duration::from_secs(
                raw.request_timeout_seconds
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        }
    }
}

impl Default for EntitlementSettings {
    fn default() -> Self {
        Self::from_raw(RawEntitlementConfig::default())
    }
}
