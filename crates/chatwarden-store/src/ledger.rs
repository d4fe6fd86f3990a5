//! Purchase ledger (`purchases.json`)

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{StoreResult, read_if_exists, write_json_atomic};

/// One purchase as recorded by an entitlement backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseEntry {
    pub product_id: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Local>,
    pub price: String,
    pub status: String,
    #[serde(
        default,
        deserialize_with = "lenient_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Purchase history plus the entitlement flags derived from it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseLedger {
    pub purchases: Vec<PurchaseEntry>,
    pub unlimited_unlocked: bool,
    pub premium_active: bool,
    #[serde(deserialize_with = "lenient_optional_timestamp")]
    pub premium_expiry: Option<DateTime<Local>>,
}

impl PurchaseLedger {
    /// Premium counts only with an expiry still in the future
    pub fn premium_active_at(&self, now: DateTime<Local>) -> bool {
        self.premium_active && self.premium_expiry.is_some_and(|expiry| now <= expiry)
    }

    /// Premium expiry if the subscription is live at `now`
    pub fn live_premium_expiry(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if self.premium_active_at(now) {
            self.premium_expiry
        } else {
            None
        }
    }
}

/// `purchases.json` on disk
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. A missing or unreadable file yields an empty ledger.
    pub fn load(&self) -> PurchaseLedger {
        let content = match read_if_exists(&self.path) {
            Ok(Some(content)) => content,
            Ok(None) => return PurchaseLedger::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read purchase ledger");
                return PurchaseLedger::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Purchase ledger is corrupt, starting empty");
                PurchaseLedger::default()
            }
        }
    }

    pub fn save(&self, ledger: &PurchaseLedger) -> StoreResult<()> {
        write_json_atomic(&self.path, ledger)?;
        debug!(
            path = %self.path.display(),
            purchases = ledger.purchases.len(),
            "Purchase ledger saved"
        );
        Ok(())
    }

    /// Load, apply `f`, save
    pub fn update<F>(&self, f: F) -> StoreResult<PurchaseLedger>
    where
        F: FnOnce(&mut PurchaseLedger),
    {
        let mut ledger = self.load();
        f(&mut ledger);
        self.save(&ledger)?;
        Ok(ledger)
    }
}

// Older ledgers carry naive local timestamps; accept both forms.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    chatwarden_util::parse_local_timestamp(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s)))
}

fn lenient_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Local>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.as_deref().and_then(chatwarden_util::parse_local_timestamp))
}
