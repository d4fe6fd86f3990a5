//! Audit event types

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Host started
    AppStarted { profile: String },

    /// Host stopped
    AppStopped,

    /// Daily counter rolled over to a new day
    DailyReset {
        previous_date: NaiveDate,
        previous_count: u32,
    },

    /// A chat send was counted
    ChatRecorded { daily_count: u32, total_count: u64 },

    /// A send was refused by the free quota
    QuotaDenied { daily_count: u32, limit: u32 },

    /// Permanent unlimited tier granted
    UnlimitedUnlocked,

    /// Premium subscription (re)activated
    PremiumActivated { expiry: DateTime<Local> },

    /// Premium subscription lapsed
    PremiumExpired { expiry: Option<DateTime<Local>> },

    /// Purchase completed (including "already purchased")
    PurchaseCompleted {
        product_id: String,
        status: String,
        message: String,
    },

    /// Purchase cancelled or failed
    PurchaseFailed {
        product_id: String,
        status: String,
        message: String,
    },

    /// Licences restored from the backend
    PurchasesRestored {
        unlimited: bool,
        premium_expiry: Option<DateTime<Local>>,
    },

    /// Watchdog saw no heartbeat within the timeout
    WatchdogTimeout { consecutive: u32, action: String },

    /// Monitored operation exceeded its threshold
    OperationSlow {
        name: String,
        duration: Duration,
        threshold: Duration,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(chatwarden_util::now(), event)
    }

    /// Event stamped with an explicit time
    pub fn at(timestamp: DateTime<Local>, event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }

    /// Short snake_case kind, matching the serialized tag
    pub fn kind(&self) -> &'static str {
        match self.event {
            AuditEventType::AppStarted { .. } => "app_started",
            AuditEventType::AppStopped => "app_stopped",
            AuditEventType::DailyReset { .. } => "daily_reset",
            AuditEventType::ChatRecorded { .. } => "chat_recorded",
            AuditEventType::QuotaDenied { .. } => "quota_denied",
            AuditEventType::UnlimitedUnlocked => "unlimited_unlocked",
            AuditEventType::PremiumActivated { .. } => "premium_activated",
            AuditEventType::PremiumExpired { .. } => "premium_expired",
            AuditEventType::PurchaseCompleted { .. } => "purchase_completed",
            AuditEventType::PurchaseFailed { .. } => "purchase_failed",
            AuditEventType::PurchasesRestored { .. } => "purchases_restored",
            AuditEventType::WatchdogTimeout { .. } => "watchdog_timeout",
            AuditEventType::OperationSlow { .. } => "operation_slow",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_matches_kind() {
        let events = [
            AuditEvent::new(AuditEventType::AppStopped),
            AuditEvent::new(AuditEventType::QuotaDenied {
                daily_count: 15,
                limit: 15,
            }),
            AuditEvent::new(AuditEventType::OperationSlow {
                name: "chat_request".into(),
                duration: Duration::from_secs(40),
                threshold: Duration::from_secs(30),
            }),
        ];

        for event in events {
            let json = serde_json::to_value(&event.event).unwrap();
            assert_eq!(json["type"], event.kind());
        }
    }
}
