//! Strongly-typed identifiers for chatwarden

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{ChatwardenError, Result};

/// Longest profile name accepted, in bytes
const MAX_PROFILE_LEN: usize = 64;

/// Name of a user profile.
///
/// Each profile owns one data directory holding its usage record, purchase
/// ledger and audit log, so the name must be safe to use as a single path
/// component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProfileId(String);

impl ProfileId {
    /// Validate and wrap a profile name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(ChatwardenError::invalid_profile(name, "must not be empty"));
        }
        if name.len() > MAX_PROFILE_LEN {
            return Err(ChatwardenError::invalid_profile(
                name,
                format!("must be at most {} bytes", MAX_PROFILE_LEN),
            ));
        }
        if name.starts_with('.') {
            return Err(ChatwardenError::invalid_profile(name, "must not start with '.'"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            let reason = format!("contains unsupported character {:?}", bad);
            return Err(ChatwardenError::invalid_profile(name, reason));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self(DEFAULT_PROFILE.to_string())
    }
}

/// Profile used when none is configured
pub const DEFAULT_PROFILE: &str = "default";

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = ChatwardenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProfileId {
    type Error = ChatwardenError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ProfileId> for String {
    fn from(id: ProfileId) -> Self {
        id.0
    }
}

/// Identifier of a locally granted purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mock-{}", self.0)
    }
}
