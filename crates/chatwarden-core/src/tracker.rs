//! Daily usage quota and tier resolution

use chatwarden_store::{AuditEvent, AuditEventType, AuditLog, UsageRecord, UsageStore};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Free chats per local calendar day
pub const FREE_DAILY_LIMIT: u32 = 15;

/// Entitlement tier, highest first: Premium > Unlimited > Free
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Unlimited,
    Premium,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Unlimited => "Unlimited",
            Tier::Premium => "Premium Subscription",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Chats left today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remaining {
    Unlimited,
    Limited(u32),
}

impl Remaining {
    /// Integer form used by hosts that expect `-1` for unlimited
    pub fn as_sentinel(&self) -> i64 {
        match self {
            Remaining::Unlimited => -1,
            Remaining::Limited(n) => i64::from(*n),
        }
    }
}

/// Point-in-time view of a profile's quota, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatus {
    pub tier: Tier,
    pub remaining: Remaining,
    pub daily_count: u32,
    pub total_count: u64,
    pub premium_expiry: Option<DateTime<Local>>,
    pub status_text: String,
}

/// Gate chat sends behind the daily free quota
///
/// Every operation takes the caller's `now`. Reads first roll the day over
/// and lapse an expired premium subscription, persisting either change.
pub struct UsageTracker {
    record: Mutex<UsageRecord>,
    store: Arc<dyn UsageStore>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl UsageTracker {
    /// Load the profile's record, falling back to defaults if it is missing
    /// or unreadable. A missing record is written out immediately.
    pub fn new(
        store: Arc<dyn UsageStore>,
        audit: Option<Arc<dyn AuditLog>>,
        now: DateTime<Local>,
    ) -> Self {
        let record = match store.load(now) {
            Ok(Some(record)) => record,
            Ok(None) => {
                let record = UsageRecord::new(now);
                if let Err(e) = store.save(&record) {
                    warn!(error = %e, "Failed to write initial usage record");
                }
                info!("Created new usage record");
                record
            }
            Err(e) => {
                warn!(error = %e, "Usage record unreadable, using defaults");
                UsageRecord::new(now)
            }
        };

        let tracker = Self {
            record: Mutex::new(record),
            store,
            audit,
        };

        {
            let mut record = tracker.record.lock().unwrap();
            tracker.refresh(&mut record, now);
        }

        tracker
    }

    /// May the user send a chat right now?
    pub fn can_send(&self, now: DateTime<Local>) -> bool {
        let mut record = self.record.lock().unwrap();
        self.refresh(&mut record, now);

        let allowed = record.is_premium_active
            || record.is_unlimited_unlocked
            || record.daily_count < FREE_DAILY_LIMIT;

        if !allowed {
            info!(
                daily_count = record.daily_count,
                limit = FREE_DAILY_LIMIT,
                "Daily free quota exhausted"
            );
            self.audit(
                now,
                AuditEventType::QuotaDenied {
                    daily_count: record.daily_count,
                    limit: FREE_DAILY_LIMIT,
                },
            );
        }

        allowed
    }

    pub fn remaining(&self, now: DateTime<Local>) -> Remaining {
        let mut record = self.record.lock().unwrap();
        self.refresh(&mut record, now);
        remaining_for(&record)
    }

    /// Count one chat. Callers check [`can_send`](Self::can_send) first; this
    /// does not re-check the quota.
    pub fn record_send(&self, now: DateTime<Local>) {
        let mut record = self.record.lock().unwrap();
        self.refresh(&mut record, now);

        record.daily_count = record.daily_count.saturating_add(1);
        record.total_count = record.total_count.saturating_add(1);
        self.persist(&record);

        debug!(
            daily_count = record.daily_count,
            total_count = record.total_count,
            "Chat recorded"
        );
        self.audit(
            now,
            AuditEventType::ChatRecorded {
                daily_count: record.daily_count,
                total_count: record.total_count,
            },
        );
    }

    /// Permanently lift the quota. Idempotent.
    pub fn unlock_unlimited(&self, now: DateTime<Local>) {
        let mut record = self.record.lock().unwrap();
        if record.is_unlimited_unlocked {
            debug!("Unlimited already unlocked");
            return;
        }

        record.is_unlimited_unlocked = true;
        self.persist(&record);

        info!("Unlimited chats unlocked");
        self.audit(now, AuditEventType::UnlimitedUnlocked);
    }

    /// Start premium for `duration_days` from `now`, replacing any current expiry.
    /// A duration past the calendar's range is ignored.
    pub fn activate_premium(&self, duration_days: u32, now: DateTime<Local>) {
        let Some(expiry) = ChronoDuration::try_days(i64::from(duration_days))
            .and_then(|duration| now.checked_add_signed(duration))
        else {
            warn!(duration_days, "Ignoring premium duration out of range");
            return;
        };
        self.set_premium(expiry, now);
    }

    /// Set premium to run until `expiry`. Returns whether premium is now active;
    /// an expiry not after `now` leaves it inactive.
    pub fn activate_premium_until(&self, expiry: DateTime<Local>, now: DateTime<Local>) -> bool {
        if expiry <= now {
            warn!(expiry = %expiry, "Ignoring premium expiry in the past");
            return false;
        }
        self.set_premium(expiry, now);
        true
    }

    fn set_premium(&self, expiry: DateTime<Local>, now: DateTime<Local>) {
        let mut record = self.record.lock().unwrap();
        record.is_premium_active = true;
        record.premium_expiry = Some(expiry);
        self.persist(&record);

        info!(expiry = %expiry, "Premium activated");
        self.audit(now, AuditEventType::PremiumActivated { expiry });
    }

    pub fn tier(&self, now: DateTime<Local>) -> Tier {
        let mut record = self.record.lock().unwrap();
        self.refresh(&mut record, now);
        tier_for(&record)
    }

    pub fn is_unlimited_unlocked(&self) -> bool {
        self.record.lock().unwrap().is_unlimited_unlocked
    }

    pub fn is_premium_active(&self, now: DateTime<Local>) -> bool {
        self.tier(now) == Tier::Premium
    }

    /// Whole days of premium left, `None` when premium is inactive
    pub fn premium_days_left(&self, now: DateTime<Local>) -> Option<i64> {
        let mut record = self.record.lock().unwrap();
        self.refresh(&mut record, now);
        premium_days_left_for(&record, now)
    }

    pub fn status_text(&self, now: DateTime<Local>) -> String {
        self.status(now).status_text
    }

    pub fn status(&self, now: DateTime<Local>) -> UsageStatus {
        let mut record = self.record.lock().unwrap();
        self.refresh(&mut record, now);

        let tier = tier_for(&record);
        let remaining = remaining_for(&record);
        let status_text = match tier {
            Tier::Premium => format!(
                "{} ({} days left)",
                tier,
                premium_days_left_for(&record, now).unwrap_or(0)
            ),
            Tier::Unlimited => format!("{} - Unlimited Chats", tier),
            Tier::Free => format!(
                "{} - {}/{} chats today",
                tier,
                remaining.as_sentinel().max(0),
                FREE_DAILY_LIMIT
            ),
        };

        UsageStatus {
            tier,
            remaining,
            daily_count: record.daily_count,
            total_count: record.total_count,
            premium_expiry: record.premium_expiry.filter(|_| record.is_premium_active),
            status_text,
        }
    }

    /// Copy of the in-memory record
    pub fn record(&self) -> UsageRecord {
        self.record.lock().unwrap().clone()
    }

    /// Roll the day over and lapse expired premium, persisting any change
    fn refresh(&self, record: &mut UsageRecord, now: DateTime<Local>) {
        let mut changed = false;

        let today = now.date_naive();
        if record.last_reset_date != today {
            let previous_date = record.last_reset_date;
            let previous_count = record.daily_count;
            record.daily_count = 0;
            record.last_reset_date = today;
            changed = true;

            info!(%previous_date, previous_count, "Daily chat count reset");
            self.audit(
                now,
                AuditEventType::DailyReset {
                    previous_date,
                    previous_count,
                },
            );
        }

        if record.is_premium_active && record.premium_expiry.is_none_or(|expiry| now > expiry) {
            record.is_premium_active = false;
            changed = true;

            info!(expiry = ?record.premium_expiry, "Premium subscription expired");
            self.audit(
                now,
                AuditEventType::PremiumExpired {
                    expiry: record.premium_expiry,
                },
            );
        }

        if changed {
            self.persist(record);
        }
    }

    fn persist(&self, record: &UsageRecord) {
        if let Err(e) = self.store.save(record) {
            warn!(error = %e, "Failed to save usage record");
        }
    }

    fn audit(&self, now: DateTime<Local>, event: AuditEventType) {
        if let Some(audit) = &self.audit
            && let Err(e) = audit.append_audit(AuditEvent::at(now, event))
        {
            warn!(error = %e, "Failed to append audit event");
        }
    }
}

fn tier_for(record: &UsageRecord) -> Tier {
    if record.is_premium_active {
        Tier::Premium
    } else if record.is_unlimited_unlocked {
        Tier::Unlimited
    } else {
        Tier::Free
    }
}

fn remaining_for(record: &UsageRecord) -> Remaining {
    match tier_for(record) {
        Tier::Free => Remaining::Limited(FREE_DAILY_LIMIT.saturating_sub(record.daily_count)),
        Tier::Unlimited | Tier::Premium => Remaining::Unlimited,
    }
}

fn premium_days_left_for(record: &UsageRecord, now: DateTime<Local>) -> Option<i64> {
    if !record.is_premium_active {
        return None;
    }
    record
        .premium_expiry
        .map(|expiry| chatwarden_util::whole_days_until(&expiry, &now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwarden_store::{JsonUsageStore, MemoryUsageStore, SqliteAuditLog};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn memory_tracker(now: DateTime<Local>) -> (Arc<MemoryUsageStore>, UsageTracker) {
        let store = Arc::new(MemoryUsageStore::new());
        let tracker = UsageTracker::new(store.clone(), None, now);
        (store, tracker)
    }

    #[test]
    fn new_record_is_persisted_immediately() {
        let now = at(2025, 3, 1, 9, 0);
        let (store, tracker) = memory_tracker(now);

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.snapshot().unwrap().first_used, now);
        assert_eq!(tracker.tier(now), Tier::Free);
        assert_eq!(tracker.remaining(now), Remaining::Limited(FREE_DAILY_LIMIT));
    }

    #[test]
    fn same_day_counts_accumulate() {
        let now = at(2025, 3, 1, 9, 0);
        let (_store, tracker) = memory_tracker(now);

        for i in 0..7 {
            tracker.record_send(now + ChronoDuration::minutes(i));
        }

        let record = tracker.record();
        assert_eq!(record.daily_count, 7);
        assert_eq!(record.total_count, 7);
        assert_eq!(tracker.remaining(now), Remaining::Limited(8));
    }

    #[test]
    fn free_quota_denies_sixteenth_chat() {
        let now = at(2025, 3, 1, 9, 0);
        let audit = Arc::new(SqliteAuditLog::in_memory().unwrap());
        let tracker = UsageTracker::new(Arc::new(MemoryUsageStore::new()), Some(audit.clone()), now);

        for _ in 0..FREE_DAILY_LIMIT {
            assert!(tracker.can_send(now));
            tracker.record_send(now);
        }

        assert!(!tracker.can_send(now));
        assert_eq!(tracker.remaining(now), Remaining::Limited(0));
        assert_eq!(tracker.status_text(now), "Free - 0/15 chats today");
        assert_eq!(audit.count_kind("quota_denied").unwrap(), 1);
        assert_eq!(audit.count_kind("chat_recorded").unwrap(), 15);
    }

    #[test]
    fn day_boundary_resets_daily_count() {
        let evening = at(2025, 3, 1, 23, 59);
        let (store, tracker) = memory_tracker(evening);

        for _ in 0..FREE_DAILY_LIMIT {
            tracker.record_send(evening);
        }
        assert!(!tracker.can_send(evening));

        let morning = at(2025, 3, 2, 0, 1);
        assert!(tracker.can_send(morning));
        assert_eq!(tracker.remaining(morning), Remaining::Limited(FREE_DAILY_LIMIT));

        let saved = store.snapshot().unwrap();
        assert_eq!(saved.daily_count, 0);
        assert_eq!(saved.last_reset_date, morning.date_naive());
        assert_eq!(saved.total_count, u64::from(FREE_DAILY_LIMIT));
    }

    #[test]
    fn send_after_midnight_counts_toward_new_day() {
        let evening = at(2025, 3, 1, 22, 0);
        let (_store, tracker) = memory_tracker(evening);
        for _ in 0..5 {
            tracker.record_send(evening);
        }

        tracker.record_send(at(2025, 3, 2, 0, 30));
        assert_eq!(tracker.record().daily_count, 1);
        assert_eq!(tracker.record().total_count, 6);
    }

    #[test]
    fn unlimited_survives_quota_and_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let now = at(2025, 3, 1, 9, 0);

        {
            let tracker = UsageTracker::new(Arc::new(JsonUsageStore::new(&path)), None, now);
            tracker.unlock_unlimited(now);
            for _ in 0..20 {
                assert!(tracker.can_send(now));
                tracker.record_send(now);
            }
        }

        let tracker = UsageTracker::new(Arc::new(JsonUsageStore::new(&path)), None, now);
        assert!(tracker.can_send(now));
        assert_eq!(tracker.tier(now), Tier::Unlimited);
        assert_eq!(tracker.remaining(now), Remaining::Unlimited);
        assert_eq!(tracker.remaining(now).as_sentinel(), -1);
        assert_eq!(tracker.status_text(now), "Unlimited - Unlimited Chats");
        assert_eq!(tracker.record().daily_count, 20);
    }

    #[test]
    fn unlock_is_idempotent() {
        let now = at(2025, 3, 1, 9, 0);
        let (store, tracker) = memory_tracker(now);

        tracker.unlock_unlimited(now);
        let saves = store.save_count();
        tracker.unlock_unlimited(now);
        assert_eq!(store.save_count(), saves);
    }

    #[test]
    fn premium_lasts_its_duration() {
        let now = at(2025, 3, 1, 9, 0);
        let (store, tracker) = memory_tracker(now);

        tracker.activate_premium(30, now);
        assert_eq!(tracker.tier(now), Tier::Premium);
        assert_eq!(tracker.status_text(now), "Premium Subscription (30 days left)");
        assert_eq!(
            tracker.premium_days_left(now + ChronoDuration::hours(36)),
            Some(28)
        );

        let later = now + ChronoDuration::days(31);
        assert_eq!(tracker.tier(later), Tier::Free);
        assert_eq!(tracker.premium_days_left(later), None);
        assert!(!store.snapshot().unwrap().is_premium_active);
    }

    #[test]
    fn expired_premium_falls_back_to_unlimited() {
        let now = at(2025, 3, 1, 9, 0);
        let (_store, tracker) = memory_tracker(now);

        tracker.unlock_unlimited(now);
        tracker.activate_premium(30, now);
        assert_eq!(tracker.tier(now), Tier::Premium);
        assert_eq!(tracker.tier(now + ChronoDuration::days(31)), Tier::Unlimited);
    }

    #[test]
    fn repeated_activation_replaces_expiry() {
        let now = at(2025, 3, 1, 9, 0);
        let (_store, tracker) = memory_tracker(now);

        tracker.activate_premium(30, now);
        let later = now + ChronoDuration::days(10);
        tracker.activate_premium(30, later);

        assert_eq!(
            tracker.record().premium_expiry,
            Some(later + ChronoDuration::days(30))
        );
    }

    #[test]
    fn activate_until_past_is_ignored() {
        let now = at(2025, 3, 1, 9, 0);
        let (_store, tracker) = memory_tracker(now);

        assert!(!tracker.activate_premium_until(now - ChronoDuration::days(1), now));
        assert_eq!(tracker.tier(now), Tier::Free);

        assert!(tracker.activate_premium_until(now + ChronoDuration::days(3), now));
        assert_eq!(tracker.premium_days_left(now), Some(3));
    }

    #[test]
    fn out_of_range_premium_duration_is_ignored() {
        let now = at(2025, 3, 1, 9, 0);
        let (store, tracker) = memory_tracker(now);
        let saves = store.save_count();

        tracker.activate_premium(u32::MAX, now);
        assert_eq!(tracker.tier(now), Tier::Free);
        assert_eq!(tracker.record().premium_expiry, None);
        assert_eq!(store.save_count(), saves);

        tracker.activate_premium(36_500, now);
        assert_eq!(tracker.tier(now), Tier::Premium);
    }

    #[test]
    fn corrupt_record_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, "this is not json").unwrap();
        let now = at(2025, 3, 1, 9, 0);

        let tracker = UsageTracker::new(Arc::new(JsonUsageStore::new(&path)), None, now);
        assert!(tracker.can_send(now));
        assert_eq!(tracker.record().total_count, 0);

        tracker.record_send(now);
        let reloaded = UsageTracker::new(Arc::new(JsonUsageStore::new(&path)), None, now);
        assert_eq!(reloaded.record().daily_count, 1);
    }

    #[test]
    fn save_failures_do_not_fail_operations() {
        let now = at(2025, 3, 1, 9, 0);
        let (store, tracker) = memory_tracker(now);
        store.set_fail_saves(true);

        tracker.record_send(now);
        tracker.unlock_unlimited(now);
        assert_eq!(tracker.record().daily_count, 1);
        assert_eq!(tracker.tier(now), Tier::Unlimited);
    }

    #[test]
    fn status_snapshot_serializes() {
        let now = at(2025, 3, 1, 9, 0);
        let (_store, tracker) = memory_tracker(now);
        tracker.record_send(now);

        let status = tracker.status(now);
        assert_eq!(status.daily_count, 1);
        assert_eq!(status.status_text, "Free - 14/15 chats today");

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["tier"], "free");
        assert_eq!(json["remaining"]["limited"], 14);
    }
}
