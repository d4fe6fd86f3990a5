//! Configuration validation

use crate::schema::{RawConfig, RawEntitlementConfig, RawWatchdogConfig};
use crate::settings::{
    BackendKind, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_PREMIUM_DAYS, DEFAULT_RESTART_AFTER, DEFAULT_WARN_AFTER,
    DEFAULT_WATCHDOG_TIMEOUT_SECS,
};
use chatwarden_util::ProfileId;
use thiserror::Error;

/// Longest subscription a single purchase may grant
const MAX_PREMIUM_DAYS: u32 = 3650;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("premium.duration_days must be between 1 and {max}, got {value}")]
    PremiumDuration { value: u32, max: u32 },

    #[error("watchdog.{field} must be greater than zero")]
    ZeroInterval { field: &'static str },

    #[error("watchdog.{field} ({value}s) must be shorter than timeout_seconds ({timeout}s)")]
    IntervalNotBelowTimeout {
        field: &'static str,
        value: u64,
        timeout: u64,
    },

    #[error("watchdog escalation invalid: {0}")]
    Escalation(String),

    #[error("Unknown entitlement backend '{0}' (expected \"mock\" or \"store\")")]
    UnknownBackend(String),

    #[error("entitlement.{field}: {message}")]
    Entitlement {
        field: &'static str,
        message: String,
    },
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(profile) = &config.app.profile
        && let Err(e) = ProfileId::new(profile.as_str())
    {
        errors.push(ValidationError::InvalidProfile(e.to_string()));
    }

    let days = config.premium.duration_days.unwrap_or(DEFAULT_PREMIUM_DAYS);
    if days == 0 || days > MAX_PREMIUM_DAYS {
        errors.push(ValidationError::PremiumDuration {
            value: days,
            max: MAX_PREMIUM_DAYS,
        });
    }

    errors.extend(validate_watchdog(&config.watchdog));
    errors.extend(validate_entitlement(&config.entitlement));

    errors
}

fn validate_watchdog(watchdog: &RawWatchdogConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let timeout = watchdog
        .timeout_seconds
        .unwrap_or(DEFAULT_WATCHDOG_TIMEOUT_SECS);
    let check = watchdog
        .check_interval_seconds
        .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);
    let heartbeat = watchdog
        .heartbeat_interval_seconds
        .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS);

    for (field, value) in [
        ("timeout_seconds", timeout),
        ("check_interval_seconds", check),
        ("heartbeat_interval_seconds", heartbeat),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroInterval { field });
        }
    }

    // Only compare against the timeout once it is known to be usable
    if timeout > 0 {
        for (field, value) in [
            ("check_interval_seconds", check),
            ("heartbeat_interval_seconds", heartbeat),
        ] {
            if value >= timeout {
                errors.push(ValidationError::IntervalNotBelowTimeout {
                    field,
                    value,
                    timeout,
                });
            }
        }
    }

    let warn_after = watchdog.warn_after.unwrap_or(DEFAULT_WARN_AFTER);
    let restart_after = watchdog.restart_after.unwrap_or(DEFAULT_RESTART_AFTER);
    if warn_after == 0 {
        errors.push(ValidationError::Escalation(
            "warn_after must be at least 1".into(),
        ));
    }
    if restart_after < warn_after {
        errors.push(ValidationError::Escalation(format!(
            "restart_after ({}) must not be below warn_after ({})",
            restart_after, warn_after
        )));
    }

    errors
}

fn validate_entitlement(entitlement: &RawEntitlementConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let backend = match entitlement.backend.as_deref() {
        None => BackendKind::Mock,
        Some(name) => match parse_backend(name) {
            Ok(kind) => kind,
            Err(e) => {
                errors.push(e);
                return errors;
            }
        },
    };

    if entitlement.request_timeout_seconds == Some(0) {
        errors.push(ValidationError::Entitlement {
            field: "request_timeout_seconds",
            message: "must be greater than zero".into(),
        });
    }

    if backend == BackendKind::Store {
        match entitlement.store_url.as_deref() {
            None | Some("") => errors.push(ValidationError::Entitlement {
                field: "store_url",
                message: "required when backend = \"store\"".into(),
            }),
            Some(url) => {
                if let Err(message) = check_store_url(url) {
                    errors.push(ValidationError::Entitlement {
                        field: "store_url",
                        message,
                    });
                }
            }
        }
    }

    errors
}

/// Parse the backend name
pub fn parse_backend(name: &str) -> Result<BackendKind, ValidationError> {
    match name.to_lowercase().as_str() {
        "mock" => Ok(BackendKind::Mock),
        "store" => Ok(BackendKind::Store),
        other => Err(ValidationError::UnknownBackend(other.to_string())),
    }
}

/// Storefront URLs must be HTTPS, except for loopback development servers.
fn check_store_url(url: &str) -> Result<(), String> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if let Some(rest) = url.strip_prefix("http://") {
        let host = rest.split(['/', ':']).next().unwrap_or_default();
        if host == "localhost" || host == "127.0.0.1" {
            return Ok(());
        }
        return Err(format!("'{}' must use https (plain http is only allowed for localhost)", url));
    }
    Err(format!("'{}' is not an http(s) URL", url))
}
