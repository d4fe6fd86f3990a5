//! Host-side reaction to consecutive watchdog timeouts

use chatwarden_config::WatchdogSettings;
use serde::{Deserialize, Serialize};

/// What the host should do after a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    None,
    /// Tell the user the app seems slow
    SoftWarning,
    /// Offer to restart the application
    OfferRestart,
}

impl EscalationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationAction::None => "none",
            EscalationAction::SoftWarning => "soft_warning",
            EscalationAction::OfferRestart => "offer_restart",
        }
    }
}

/// Thresholds on the consecutive timeout count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub warn_after: u32,
    pub restart_after: u32,
}

impl EscalationPolicy {
    pub fn from_settings(settings: &WatchdogSettings) -> Self {
        Self {
            warn_after: settings.warn_after,
            restart_after: settings.restart_after,
        }
    }

    pub fn action(&self, consecutive: u32) -> EscalationAction {
        if consecutive == 0 {
            EscalationAction::None
        } else if consecutive >= self.restart_after {
            EscalationAction::OfferRestart
        } else if consecutive >= self.warn_after {
            EscalationAction::SoftWarning
        } else {
            EscalationAction::None
        }
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            warn_after: 1,
            restart_after: 3,
        }
    }
}
