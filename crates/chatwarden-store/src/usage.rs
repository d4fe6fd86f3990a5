//! Usage record persistence
//!
//! The on-disk document is versioned. Documents without `schema_version`
//! predate versioning (version 0): any field may be missing and timestamps are
//! naive local ISO-8601 strings. Loading migrates field by field to the
//! current in-memory [`UsageRecord`]; saving always writes the current version.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, warn};

use crate::{StoreError, StoreResult, UsageStore, read_if_exists, write_json_atomic};

/// Newest `usage.json` schema this build understands
pub const USAGE_SCHEMA_VERSION: u32 = 1;

/// One profile's usage and entitlement state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub last_reset_date: NaiveDate,
    pub daily_count: u32,
    pub total_count: u64,
    pub is_unlimited_unlocked: bool,
    pub is_premium_active: bool,
    pub premium_expiry: Option<DateTime<Local>>,
    pub first_used: DateTime<Local>,
}

impl UsageRecord {
    /// Fresh record for a profile seen for the first time at `now`
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            last_reset_date: now.date_naive(),
            daily_count: 0,
            total_count: 0,
            is_unlimited_unlocked: false,
            is_premium_active: false,
            premium_expiry: None,
            first_used: now,
        }
    }

    /// Build a record from a parsed `usage.json` value of any known version.
    ///
    /// Missing or ill-typed fields fall back to the values of
    /// [`UsageRecord::new`]. A document newer than [`USAGE_SCHEMA_VERSION`]
    /// is rejected.
    pub fn from_document(value: &Value, now: DateTime<Local>) -> StoreResult<Self> {
        let Some(doc) = value.as_object() else {
            return Err(StoreError::Corrupt("usage document is not an object".into()));
        };

        let version = match doc.get("schema_version") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| StoreError::Corrupt(format!("bad schema_version: {}", v)))?,
        };

        if version > u64::from(USAGE_SCHEMA_VERSION) {
            return Err(StoreError::UnsupportedVersion {
                found: version,
                supported: USAGE_SCHEMA_VERSION,
            });
        }

        if version == 0 {
            debug!("Migrating legacy usage document to schema version {}", USAGE_SCHEMA_VERSION);
        }

        let defaults = Self::new(now);

        let last_reset_date = str_field(doc, "last_reset")
            .and_then(chatwarden_util::parse_date)
            .unwrap_or(defaults.last_reset_date);

        let daily_count = u64_field(doc, "daily_count")
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(defaults.daily_count);

        let total_count = u64_field(doc, "total_chats").unwrap_or(defaults.total_count);

        let premium_expiry =
            str_field(doc, "premium_expiry").and_then(chatwarden_util::parse_local_timestamp);

        // A premium flag without a readable expiry can never be honored.
        let is_premium_active = bool_field(doc, "is_premium").unwrap_or(false) && premium_expiry.is_some();

        let first_used = str_field(doc, "first_used")
            .and_then(chatwarden_util::parse_local_timestamp)
            .unwrap_or(defaults.first_used);

        Ok(Self {
            last_reset_date,
            daily_count,
            total_count: total_count.max(u64::from(daily_count)),
            is_unlimited_unlocked: bool_field(doc, "is_unlimited").unwrap_or(false),
            is_premium_active,
            premium_expiry,
            first_used,
        })
    }

    /// Serializable form written to disk
    pub fn to_document(&self) -> UsageDocument {
        UsageDocument {
            schema_version: USAGE_SCHEMA_VERSION,
            last_reset: self.last_reset_date,
            daily_count: self.daily_count,
            total_chats: self.total_count,
            is_unlimited: self.is_unlimited_unlocked,
            is_premium: self.is_premium_active,
            premium_expiry: self.premium_expiry,
            first_used: self.first_used,
        }
    }
}

/// Current-version `usage.json` layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageDocument {
    pub schema_version: u32,
    pub last_reset: NaiveDate,
    pub daily_count: u32,
    pub total_chats: u64,
    pub is_unlimited: bool,
    pub is_premium: bool,
    pub premium_expiry: Option<DateTime<Local>>,
    pub first_used: DateTime<Local>,
}

fn str_field<'a>(doc: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

fn u64_field(doc: &Map<String, Value>, key: &str) -> Option<u64> {
    doc.get(key).and_then(Value::as_u64)
}

fn bool_field(doc: &Map<String, Value>, key: &str) -> Option<bool> {
    doc.get(key).and_then(Value::as_bool)
}

/// `usage.json` on disk
pub struct JsonUsageStore {
    path: PathBuf,
}

impl JsonUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStore for JsonUsageStore {
    fn load(&self, now: DateTime<Local>) -> StoreResult<Option<UsageRecord>> {
        let Some(content) = read_if_exists(&self.path)? else {
            debug!(path = %self.path.display(), "No usage record on disk");
            return Ok(None);
        };

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e)))?;

        UsageRecord::from_document(&value, now).map(Some)
    }

    fn save(&self, record: &UsageRecord) -> StoreResult<()> {
        write_json_atomic(&self.path, &record.to_document())?;
        debug!(
            path = %self.path.display(),
            daily_count = record.daily_count,
            total_count = record.total_count,
            "Usage record saved"
        );
        Ok(())
    }
}

/// In-process usage store for hosts without a data directory and for tests
#[derive(Default)]
pub struct MemoryUsageStore {
    record: Mutex<Option<UsageRecord>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing record
    pub fn with_record(record: UsageRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    /// Last saved record
    pub fn snapshot(&self) -> Option<UsageRecord> {
        self.record.lock().unwrap().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail with an IO error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl UsageStore for MemoryUsageStore {
    fn load(&self, _now: DateTime<Local>) -> StoreResult<Option<UsageRecord>> {
        Ok(self.record.lock().unwrap().clone())
    }

    fn save(&self, record: &UsageRecord) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            warn!("Memory usage store configured to fail saves");
            return Err(StoreError::Io(std::io::Error::other("save disabled")));
        }
        *self.record.lock().unwrap() = Some(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
