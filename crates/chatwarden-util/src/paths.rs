//! Default paths for chatwarden components
//!
//! Provides centralized path defaults that all crates can use.
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/chatwarden/config.toml` or `~/.config/chatwarden/config.toml`
//! - Data: `$XDG_DATA_HOME/chatwarden` or `~/.local/share/chatwarden`
//! - Logs: `$XDG_STATE_HOME/chatwarden` or `~/.local/state/chatwarden`
//!
//! Per-profile state lives under `<data>/profiles/<profile>/`.

use std::path::{Path, PathBuf};

use crate::ProfileId;

/// Environment variable for overriding the data directory
pub const CHATWARDEN_DATA_DIR_ENV: &str = "CHATWARDEN_DATA_DIR";

/// Usage record filename within a profile directory
pub const USAGE_FILE: &str = "usage.json";

/// Purchase ledger filename within a profile directory
pub const PURCHASES_FILE: &str = "purchases.json";

/// Audit database filename within a profile directory
pub const AUDIT_DB_FILE: &str = "audit.db";

/// Application subdirectory name
const APP_DIR: &str = "chatwarden";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$XDG_CONFIG_HOME/chatwarden/config.toml` (if XDG_CONFIG_HOME is set)
/// 2. `~/.config/chatwarden/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/tmp").join(APP_DIR).join(CONFIG_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$CHATWARDEN_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/chatwarden` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/chatwarden` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(CHATWARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking CHATWARDEN_DATA_DIR env var.
/// Used for default values in configs where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default log directory.
///
/// Order of precedence:
/// 1. `$XDG_STATE_HOME/chatwarden` (if XDG_STATE_HOME is set)
/// 2. `~/.local/state/chatwarden` (fallback)
pub fn default_log_dir() -> PathBuf {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(state_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("logs")
}

/// Directory holding one profile's state
pub fn profile_dir(data_dir: &Path, profile: &ProfileId) -> PathBuf {
    data_dir.join("profiles").join(profile.as_str())
}
