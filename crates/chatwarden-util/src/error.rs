//! Error types for chatwarden

use thiserror::Error;

/// Core error type for chatwarden operations
#[derive(Debug, Error)]
pub enum ChatwardenError {
    #[error("Invalid profile name '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },

    #[error("Watchdog error: {0}")]
    WatchdogError(String),
}

impl ChatwardenError {
    pub fn invalid_profile(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidProfile {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn watchdog(msg: impl Into<String>) -> Self {
        Self::WatchdogError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ChatwardenError>;
