//! Store trait definitions

use chrono::{DateTime, Local};

use crate::{AuditEvent, StoreResult, UsageRecord};

/// Persistence for a single profile's usage record
pub trait UsageStore: Send + Sync {
    /// Load the record. `Ok(None)` means no record has been written yet.
    ///
    /// `now` supplies defaults for fields an older document lacks.
    fn load(&self, now: DateTime<Local>) -> StoreResult<Option<UsageRecord>>;

    /// Persist the record, replacing any previous one
    fn save(&self, record: &UsageRecord) -> StoreResult<()>;
}

/// Append-only audit trail
pub trait AuditLog: Send + Sync {
    /// Append an audit event, returning its assigned id
    fn append_audit(&self, event: AuditEvent) -> StoreResult<i64>;

    /// Most recent events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    /// Check if the log is usable
    fn is_healthy(&self) -> bool;
}
