//! Purchase and restore, applied to the usage tracker

use chatwarden_entitlement::{
    EntitlementBackend, EntitlementResult, Product, PurchaseOutcome, PurchaseStatus,
};
use chatwarden_store::{AuditEvent, AuditEventType, AuditLog};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::UsageTracker;

/// What a restore found and applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub unlimited: bool,
    pub premium_expiry: Option<DateTime<Local>>,
    pub premium_restored: bool,
}

impl RestoreSummary {
    pub fn message(&self) -> &'static str {
        if self.unlimited || self.premium_restored {
            "Purchases restored successfully!"
        } else {
            "No purchases to restore"
        }
    }
}

/// Runs purchases against a backend and updates the tracker on success
pub struct PurchaseFlow {
    tracker: Arc<UsageTracker>,
    backend: Arc<dyn EntitlementBackend>,
    audit: Option<Arc<dyn AuditLog>>,
    premium_days: u32,
}

impl PurchaseFlow {
    pub fn new(
        tracker: Arc<UsageTracker>,
        backend: Arc<dyn EntitlementBackend>,
        premium_days: u32,
    ) -> Self {
        Self {
            tracker,
            backend,
            audit: None,
            premium_days,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn backend(&self) -> &Arc<dyn EntitlementBackend> {
        &self.backend
    }

    /// Buy the permanent unlock. Already-unlocked profiles never reach the backend.
    pub async fn purchase_unlimited(&self, now: DateTime<Local>) -> PurchaseOutcome {
        let product = Product::UnlimitedUnlock;

        let outcome = if self.tracker.is_unlimited_unlocked() {
            PurchaseOutcome::new(
                product,
                PurchaseStatus::AlreadyPurchased,
                "You already have unlimited chats!",
            )
        } else {
            let outcome = self.backend.purchase(product).await;
            if outcome.success() {
                self.tracker.unlock_unlimited(now);
            }
            outcome
        };

        self.record(now, &outcome);
        outcome
    }

    /// Buy a premium period. An active subscription never reaches the backend.
    ///
    /// The backend's expiry wins when it reports one, so a subscription that
    /// was already owned keeps its real end date.
    pub async fn purchase_premium(&self, now: DateTime<Local>) -> PurchaseOutcome {
        let product = Product::PremiumSubscription;

        let outcome = if self.tracker.is_premium_active(now) {
            PurchaseOutcome::new(
                product,
                PurchaseStatus::AlreadyPurchased,
                "You already have an active Premium subscription!",
            )
        } else {
            let outcome = self.backend.purchase(product).await;
            if outcome.success() {
                match outcome.expiry {
                    Some(expiry) => {
                        self.tracker.activate_premium_until(expiry, now);
                    }
                    None => self.tracker.activate_premium(self.premium_days, now),
                }
            }
            outcome
        };

        self.record(now, &outcome);
        outcome
    }

    /// Pull licences from the backend and apply them
    pub async fn restore(&self, now: DateTime<Local>) -> EntitlementResult<RestoreSummary> {
        let licenses = match self.backend.licenses().await {
            Ok(licenses) => licenses,
            Err(e) => {
                warn!(error = %e, "Failed to restore purchases");
                return Err(e);
            }
        };

        if licenses.unlimited {
            self.tracker.unlock_unlimited(now);
        }

        let premium_restored = licenses
            .premium_expiry
            .is_some_and(|expiry| self.tracker.activate_premium_until(expiry, now));

        let summary = RestoreSummary {
            unlimited: licenses.unlimited,
            premium_expiry: licenses.premium_expiry,
            premium_restored,
        };

        info!(
            unlimited = summary.unlimited,
            premium_restored = summary.premium_restored,
            "Purchases restored"
        );
        self.audit(
            now,
            AuditEventType::PurchasesRestored {
                unlimited: summary.unlimited,
                premium_expiry: summary.premium_expiry,
            },
        );

        Ok(summary)
    }

    fn record(&self, now: DateTime<Local>, outcome: &PurchaseOutcome) {
        let product_id = outcome.product.id().to_string();
        let status = outcome.status.as_str().to_string();
        let message = outcome.message.clone();

        if outcome.success() {
            info!(product = %outcome.product, status = %status, "Purchase completed");
            self.audit(
                now,
                AuditEventType::PurchaseCompleted {
                    product_id,
                    status,
                    message,
                },
            );
        } else {
            warn!(product = %outcome.product, status = %status, message = %message, "Purchase not completed");
            self.audit(
                now,
                AuditEventType::PurchaseFailed {
                    product_id,
                    status,
                    message,
                },
            );
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tier;
    use async_trait::async_trait;
    use chatwarden_entitlement::{
        BackendCapabilities, EntitlementError, LicenseSnapshot, MockStorefront,
    };
    use chatwarden_store::{LedgerFile, MemoryUsageStore, SqliteAuditLog};
    use chrono::Duration as ChronoDuration;

    struct FixedLicenses(Option<LicenseSnapshot>, BackendCapabilities);

    #[async_trait]
    impl EntitlementBackend for FixedLicenses {
        fn capabilities(&self) -> &BackendCapabilities {
            &self.1
        }

        async fn purchase(&self, product: Product) -> PurchaseOutcome {
            PurchaseOutcome::new(product, PurchaseStatus::Succeeded, "ok")
        }

        async fn licenses(&self) -> EntitlementResult<LicenseSnapshot> {
            self.0.clone().ok_or_else(|| EntitlementError::Api {
                status: 503,
                message: "unavailable".into(),
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        tracker: Arc<UsageTracker>,
        backend: Arc<MockStorefront>,
        audit: Arc<SqliteAuditLog>,
        flow: PurchaseFlow,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let now = chatwarden_util::now();
        let tracker = Arc::new(UsageTracker::new(Arc::new(MemoryUsageStore::new()), None, now));
        let backend = Arc::new(MockStorefront::new(dir.path().join("purchases.json")));
        let audit = Arc::new(SqliteAuditLog::in_memory().unwrap());
        let flow = PurchaseFlow::new(tracker.clone(), backend.clone(), 30).with_audit(audit.clone());
        Fixture {
            dir,
            tracker,
            backend,
            audit,
            flow,
        }
    }

    #[tokio::test]
    async fn unlimited_purchase_unlocks_tracker() {
        let f = fixture();
        let now = chatwarden_util::now();

        let outcome = f.flow.purchase_unlimited(now).await;
        assert!(outcome.success());
        assert_eq!(f.tracker.tier(now), Tier::Unlimited);

        // Second attempt short-circuits
        let again = f.flow.purchase_unlimited(now).await;
        assert_eq!(again.status, PurchaseStatus::AlreadyPurchased);
        assert_eq!(again.message, "You already have unlimited chats!");
        assert_eq!(f.backend.purchase_requests(), 1);
        assert_eq!(f.audit.count_kind("purchase_completed").unwrap(), 2);
    }

    #[tokio::test]
    async fn premium_purchase_activates_subscription() {
        let f = fixture();
        let now = chatwarden_util::now();

        assert!(f.flow.purchase_premium(now).await.success());
        assert_eq!(f.tracker.tier(now), Tier::Premium);
        assert_eq!(f.tracker.premium_days_left(now), Some(30));

        let again = f.flow.purchase_premium(now).await;
        assert_eq!(again.status, PurchaseStatus::AlreadyPurchased);
        assert_eq!(f.backend.purchase_requests(), 1);
    }

    #[tokio::test]
    async fn premium_without_store_expiry_uses_configured_days() {
        let now = chatwarden_util::now();
        let tracker = Arc::new(UsageTracker::new(Arc::new(MemoryUsageStore::new()), None, now));
        let backend = Arc::new(FixedLicenses(None, BackendCapabilities::storefront()));

        let outcome = PurchaseFlow::new(tracker.clone(), backend, 7)
            .purchase_premium(now)
            .await;
        assert!(outcome.success());
        assert_eq!(tracker.premium_days_left(now), Some(7));
    }

    #[tokio::test]
    async fn owned_subscription_keeps_store_expiry() {
        let f = fixture();
        let now = chatwarden_util::now();
        let store_expiry = now + ChronoDuration::days(5);
        LedgerFile::new(f.dir.path().join("purchases.json"))
            .update(|ledger| {
                ledger.premium_active = true;
                ledger.premium_expiry = Some(store_expiry);
            })
            .unwrap();

        let outcome = f.flow.purchase_premium(now).await;
        assert_eq!(outcome.status, PurchaseStatus::AlreadyPurchased);
        assert_eq!(f.tracker.tier(now), Tier::Premium);
        assert!(matches!(f.tracker.premium_days_left(now), Some(4 | 5)));
        assert_eq!(
            f.tracker.record().premium_expiry.map(|e| e.timestamp()),
            Some(store_expiry.timestamp())
        );
        assert_eq!(f.backend.purchase_requests(), 1);
    }

    #[tokio::test]
    async fn failed_purchase_changes_nothing() {
        let f = fixture();
        let now = chatwarden_util::now();
        *f.backend.fail_purchase.lock().unwrap() = true;

        let outcome = f.flow.purchase_unlimited(now).await;
        assert!(!outcome.success());
        assert_eq!(f.tracker.tier(now), Tier::Free);
        assert_eq!(f.audit.count_kind("purchase_failed").unwrap(), 1);
    }

    #[tokio::test]
    async fn restore_applies_ledger() {
        let f = fixture();
        let now = chatwarden_util::now();
        f.backend.purchase(Product::UnlimitedUnlock).await;
        f.backend.purchase(Product::PremiumSubscription).await;

        let summary = f.flow.restore(now).await.unwrap();
        assert!(summary.unlimited);
        assert!(summary.premium_restored);
        assert_eq!(summary.message(), "Purchases restored successfully!");
        assert_eq!(f.tracker.tier(now), Tier::Premium);
        assert!(f.tracker.is_unlimited_unlocked());
        assert_eq!(f.audit.count_kind("purchases_restored").unwrap(), 1);
    }

    #[tokio::test]
    async fn restore_ignores_lapsed_premium() {
        let now = chatwarden_util::now();
        let tracker = Arc::new(UsageTracker::new(Arc::new(MemoryUsageStore::new()), None, now));
        let backend = Arc::new(FixedLicenses(
            Some(LicenseSnapshot {
                unlimited: false,
                premium_expiry: Some(now - ChronoDuration::days(2)),
            }),
            BackendCapabilities::storefront(),
        ));

        let summary = PurchaseFlow::new(tracker.clone(), backend, 30)
            .restore(now)
            .await
            .unwrap();
        assert!(!summary.premium_restored);
        assert_eq!(summary.message(), "No purchases to restore");
        assert_eq!(tracker.tier(now), Tier::Free);
    }

    #[tokio::test]
    async fn restore_propagates_backend_errors() {
        let now = chatwarden_util::now();
        let tracker = Arc::new(UsageTracker::new(Arc::new(MemoryUsageStore::new()), None, now));
        let backend = Arc::new(FixedLicenses(None, BackendCapabilities::storefront()));

        let result = PurchaseFlow::new(tracker, backend, 30).restore(now).await;
        assert!(matches!(result, Err(EntitlementError::Api { status: 503, .. })));
    }
}
