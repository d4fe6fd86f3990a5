//! Integration tests for chatwarden
//!
//! These tests wire the crates together the way the host does and verify
//! end-to-end behavior against on-disk profile directories.

use chatwarden_config::parse_config;
use chatwarden_core::{
    EscalationAction, EscalationPolicy, FREE_DAILY_LIMIT, PurchaseFlow, Remaining, Tier,
    UsageTracker, Watchdog, WatchdogConfig,
};
use chatwarden_entitlement::{EntitlementBackend, MockStorefront, PurchaseStatus, build_backend};
use chatwarden_store::{AuditLog, JsonUsageStore, LedgerFile, SqliteAuditLog};
use chatwarden_util::{AUDIT_DB_FILE, PURCHASES_FILE, ProfileId, USAGE_FILE, profile_dir};
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

struct Profile {
    _tmp: tempfile::TempDir,
    dir: PathBuf,
}

impl Profile {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let dir = profile_dir(tmp.path(), &ProfileId::default());
        std::fs::create_dir_all(&dir).unwrap();
        Self { _tmp: tmp, dir }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn audit(&self) -> Arc<SqliteAuditLog> {
        Arc::new(SqliteAuditLog::open(self.path(AUDIT_DB_FILE)).unwrap())
    }

    fn tracker(
        &self,
        audit: Option<Arc<SqliteAuditLog>>,
        now: DateTime<Local>,
    ) -> Arc<UsageTracker> {
        Arc::new(UsageTracker::new(
            Arc::new(JsonUsageStore::new(self.path(USAGE_FILE))),
            audit.map(|a| a as Arc<dyn AuditLog>),
            now,
        ))
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_free_user_day() {
    let profile = Profile::new();
    let audit = profile.audit();
    let day1 = at(2025, 5, 20, 10);
    let tracker = profile.tracker(Some(audit.clone()), day1);

    for i in 0..FREE_DAILY_LIMIT {
        assert!(tracker.can_send(day1), "chat {} should be allowed", i + 1);
        tracker.record_send(day1);
    }
    assert!(!tracker.can_send(day1), "16th chat must be denied");
    assert_eq!(tracker.remaining(day1), Remaining::Limited(0));

    let day2 = at(2025, 5, 21, 8);
    assert_eq!(tracker.remaining(day2), Remaining::Limited(FREE_DAILY_LIMIT));
    assert!(tracker.can_send(day2));

    let on_disk = read_json(&profile.path(USAGE_FILE));
    assert_eq!(on_disk["schema_version"], 1);
    assert_eq!(on_disk["daily_count"], 0);
    assert_eq!(on_disk["total_chats"], 15);
    assert_eq!(on_disk["last_reset"], "2025-05-21");

    assert_eq!(audit.count_kind("chat_recorded").unwrap(), 15);
    assert_eq!(audit.count_kind("quota_denied").unwrap(), 1);
    assert_eq!(audit.count_kind("daily_reset").unwrap(), 1);
}

#[test]
fn test_count_survives_restart_same_day() {
    let profile = Profile::new();
    let now = at(2025, 5, 20, 10);

    {
        let tracker = profile.tracker(None, now);
        for _ in 0..4 {
            tracker.record_send(now);
        }
    }

    let tracker = profile.tracker(None, now + ChronoDuration::hours(3));
    assert_eq!(tracker.record().daily_count, 4);
    assert_eq!(
        tracker.status_text(now + ChronoDuration::hours(3)),
        "Free - 11/15 chats today"
    );
}

#[tokio::test]
async fn test_unlimited_purchase_persists() {
    let profile = Profile::new();
    let audit = profile.audit();
    let now = chatwarden_util::now();

    {
        let tracker = profile.tracker(Some(audit.clone()), now);
        let backend = Arc::new(MockStorefront::new(profile.path(PURCHASES_FILE)));
        let flow = PurchaseFlow::new(tracker.clone(), backend, 30).with_audit(audit.clone());

        let outcome = flow.purchase_unlimited(now).await;
        assert_eq!(outcome.status, PurchaseStatus::Succeeded);
        assert_eq!(outcome.message, "Mock purchase successful! (Development mode)");

        for _ in 0..20 {
            assert!(tracker.can_send(now));
            tracker.record_send(now);
        }
    }

    // Process restart
    let tracker = profile.tracker(None, now);
    assert_eq!(tracker.tier(now), Tier::Unlimited);
    assert!(tracker.can_send(now));
    assert_eq!(tracker.remaining(now).as_sentinel(), -1);

    let ledger = LedgerFile::new(profile.path(PURCHASES_FILE)).load();
    assert!(ledger.unlimited_unlocked);
    assert_eq!(ledger.purchases.len(), 1);
    assert_eq!(ledger.purchases[0].product_id, "unlimited_unlock");

    assert_eq!(audit.count_kind("unlimited_unlocked").unwrap(), 1);
    assert_eq!(audit.count_kind("purchase_completed").unwrap(), 1);
}

#[test]
fn test_premium_expires() {
    let profile = Profile::new();
    let now = at(2025, 1, 10, 12);
    let tracker = profile.tracker(None, now);

    tracker.activate_premium(30, now);
    assert_eq!(tracker.tier(now), Tier::Premium);
    assert_eq!(tracker.remaining(now), Remaining::Unlimited);

    let later = now + ChronoDuration::days(31);
    assert_eq!(tracker.tier(later), Tier::Free);

    let on_disk = read_json(&profile.path(USAGE_FILE));
    assert_eq!(on_disk["is_premium"], false);

    // Expiry is checked again after a restart, not trusted from the flag
    let reloaded = profile.tracker(None, later);
    assert_eq!(reloaded.tier(later), Tier::Free);
}

#[test]
fn test_legacy_usage_file_is_migrated() {
    let profile = Profile::new();
    std::fs::write(
        profile.path(USAGE_FILE),
        r#"{
  "last_reset": "2025-04-02",
  "daily_count": 9,
  "total_chats": 120,
  "is_unlimited": false,
  "is_premium": true,
  "premium_expiry": "2025-04-20T09:15:00.250000",
  "first_used": "2024-12-01T18:00:00.000001"
}"#,
    )
    .unwrap();

    let now = at(2025, 4, 2, 15);
    let tracker = profile.tracker(None, now);
    assert_eq!(tracker.tier(now), Tier::Premium);
    assert_eq!(tracker.record().daily_count, 9);
    assert_eq!(tracker.record().total_count, 120);

    tracker.record_send(now);
    let on_disk = read_json(&profile.path(USAGE_FILE));
    assert_eq!(on_disk["schema_version"], 1);
    assert_eq!(on_disk["total_chats"], 121);
}

#[test]
fn test_unreadable_usage_file_defaults() {
    let profile = Profile::new();
    std::fs::write(profile.path(USAGE_FILE), r#"{"schema_version": 7}"#).unwrap();

    let now = at(2025, 4, 2, 15);
    let tracker = profile.tracker(None, now);
    assert_eq!(tracker.tier(now), Tier::Free);
    assert_eq!(tracker.remaining(now), Remaining::Limited(FREE_DAILY_LIMIT));
}

#[tokio::test]
async fn test_restore_after_losing_usage_file() {
    let profile = Profile::new();
    let now = chatwarden_util::now();
    let settings = parse_config("config_version = 1").unwrap();

    {
        let tracker = profile.tracker(None, now);
        let backend = build_backend(&settings.entitlement, &profile.path(PURCHASES_FILE)).unwrap();
        let flow = PurchaseFlow::new(tracker, backend, settings.premium.duration_days);
        assert!(flow.purchase_premium(now).await.success());
        assert!(flow.purchase_unlimited(now).await.success());
    }

    std::fs::remove_file(profile.path(USAGE_FILE)).unwrap();

    let tracker = profile.tracker(None, now);
    assert_eq!(tracker.tier(now), Tier::Free);

    let backend = build_backend(&settings.entitlement, &profile.path(PURCHASES_FILE)).unwrap();
    let summary = PurchaseFlow::new(tracker.clone(), backend, 30)
        .restore(now)
        .await
        .unwrap();

    assert!(summary.unlimited);
    assert!(summary.premium_restored);
    assert_eq!(tracker.tier(now), Tier::Premium);
    assert!(tracker.is_unlimited_unlocked());
}

#[tokio::test(start_paused = true)]
async fn test_configured_watchdog_escalates() {
    let settings = parse_config(
        r#"
        config_version = 1

        [watchdog]
        timeout_seconds = 10
        check_interval_seconds = 2
        heartbeat_interval_seconds = 1
        warn_after = 1
        restart_after = 3
        "#,
    )
    .unwrap();

    let watchdog = Watchdog::new(WatchdogConfig::from(&settings.watchdog));
    let policy = EscalationPolicy::from_settings(&settings.watchdog);
    let actions = Arc::new(Mutex::new(Vec::new()));

    let sink = actions.clone();
    watchdog
        .start(move |count| sink.lock().unwrap().push(policy.action(count)))
        .unwrap();

    // Healthy for a while
    for _ in 0..30 {
        tokio::time::sleep(settings.watchdog.heartbeat_interval).await;
        watchdog.heartbeat();
    }
    assert!(actions.lock().unwrap().is_empty());

    // Then hang
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(
        actions.lock().unwrap()[..3],
        [
            EscalationAction::SoftWarning,
            EscalationAction::SoftWarning,
            EscalationAction::OfferRestart,
        ]
    );

    watchdog.heartbeat();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(watchdog.consecutive_timeouts(), 0);

    watchdog.stop().await;
    assert!(!watchdog.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_suspension_around_long_call() {
    let watchdog = Arc::new(Watchdog::new(WatchdogConfig {
        timeout: Duration::from_secs(30),
        check_interval: Duration::from_secs(5),
    }));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    watchdog
        .start(move |count| sink.lock().unwrap().push(count))
        .unwrap();

    // A chat request that takes 50s with no heartbeats
    watchdog.disable_temporarily(Duration::from_secs(120)).unwrap();
    {
        let _op = watchdog.operation("chat_request", Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(50)).await;
    }
    watchdog.resume();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(calls.lock().unwrap().is_empty());

    let ops = watchdog.recent_operations();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].exceeded);

    watchdog.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_purchase_runs_as_watchdog_operation() {
    let profile = Profile::new();
    let audit = profile.audit();
    let now = chatwarden_util::now();
    let settings = parse_config("config_version = 1").unwrap();

    let tracker = profile.tracker(Some(audit.clone()), now);
    let backend = build_backend(&settings.entitlement, &profile.path(PURCHASES_FILE)).unwrap();
    let flow = PurchaseFlow::new(tracker.clone(), backend, settings.premium.duration_days);

    let watchdog = Watchdog::new(WatchdogConfig::from(&settings.watchdog)).with_audit(audit);
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let sink = timeouts.clone();
    watchdog
        .start(move |count| sink.lock().unwrap().push(count))
        .unwrap();

    let threshold = settings.entitlement.request_timeout;
    watchdog
        .disable_temporarily(threshold + settings.watchdog.timeout)
        .unwrap();
    let outcome = {
        let _op = watchdog.operation("purchase:premium_subscription", threshold);
        let outcome = flow.purchase_premium(now).await;
        tokio::time::sleep(settings.watchdog.timeout * 2).await;
        outcome
    };
    watchdog.resume();

    assert!(outcome.success());
    assert_eq!(tracker.tier(now), Tier::Premium);
    assert!(timeouts.lock().unwrap().is_empty());

    let ops = watchdog.recent_operations();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].name, "purchase:premium_subscription");
    assert!(ops[0].exceeded);

    watchdog.stop().await;
}

#[test]
fn test_profile_components_report_healthy() {
    let profile = Profile::new();
    let settings = parse_config("config_version = 1").unwrap();

    let audit = profile.audit();
    assert!(audit.is_healthy());

    let backend = build_backend(&settings.entitlement, &profile.path(PURCHASES_FILE)).unwrap();
    assert!(backend.is_healthy());
    assert!(!backend.capabilities().charges_payment);
}
