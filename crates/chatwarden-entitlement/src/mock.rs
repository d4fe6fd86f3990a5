//! Mock storefront for development and testing

use async_trait::async_trait;
use chatwarden_store::{LedgerFile, PurchaseEntry};
use chatwarden_util::TransactionId;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::{
    BackendCapabilities, EntitlementBackend, EntitlementResult, LicenseSnapshot, Product,
    PurchaseOutcome, PurchaseStatus,
};

/// Storefront that grants every purchase locally, without payment
pub struct MockStorefront {
    capabilities: BackendCapabilities,
    ledger: LedgerFile,
    purchases: AtomicU64,

    /// Configure purchases to fail
    pub fail_purchase: Arc<Mutex<bool>>,

    /// Configure purchases to be cancelled by the "user"
    pub cancel_purchase: Arc<Mutex<bool>>,
}

impl MockStorefront {
    pub fn new(ledger_path: impl AsRef<Path>) -> Self {
        Self {
            capabilities: BackendCapabilities::mock(),
            ledger: LedgerFile::new(ledger_path.as_ref()),
            purchases: AtomicU64::new(0),
            fail_purchase: Arc::new(Mutex::new(false)),
            cancel_purchase: Arc::new(Mutex::new(false)),
        }
    }

    /// Number of purchase requests that reached this backend
    pub fn purchase_requests(&self) -> u64 {
        self.purchases.load(Ordering::SeqCst)
    }

    /// Record `product` in the ledger. Returns the status and, for the
    /// subscription, the expiry the ledger now holds.
    fn grant(
        &self,
        product: Product,
    ) -> EntitlementResult<(PurchaseStatus, Option<DateTime<Local>>)> {
        let now = chatwarden_util::now();
        let mut status = PurchaseStatus::Succeeded;

        let ledger = self.ledger.update(|ledger| match product {
            Product::UnlimitedUnlock => {
                if ledger.unlimited_unlocked {
                    status = PurchaseStatus::AlreadyPurchased;
                    return;
                }
                ledger.unlimited_unlocked = true;
                ledger.purchases.push(PurchaseEntry {
                    product_id: product.id().to_string(),
                    timestamp: now,
                    price: product.price().to_string(),
                    status: "completed (mock)".into(),
                    expiry: None,
                    store_id: Some(TransactionId::new().to_string()),
                    note: Some("This is a mock purchase - no real payment".into()),
                });
            }
            Product::PremiumSubscription => {
                if ledger.premium_active_at(now) {
                    status = PurchaseStatus::AlreadyPurchased;
                    return;
                }
                let days = product.period_days().unwrap_or(30);
                let expiry = now + ChronoDuration::days(i64::from(days));
                ledger.premium_active = true;
                ledger.premium_expiry = Some(expiry);
                ledger.purchases.push(PurchaseEntry {
                    product_id: product.id().to_string(),
                    timestamp: now,
                    price: product.price().to_string(),
                    status: "active (mock)".into(),
                    expiry: Some(expiry),
                    store_id: Some(TransactionId::new().to_string()),
                    note: Some("This is a mock subscription - no real payment".into()),
                });
            }
        })?;

        let expiry = match product {
            Product::UnlimitedUnlock => None,
            Product::PremiumSubscription => ledger.live_premium_expiry(now),
        };
        Ok((status, expiry))
    }
}

#[async_trait]
impl EntitlementBackend for MockStorefront {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    async fn purchase(&self, product: Product) -> PurchaseOutcome {
        self.purchases.fetch_add(1, Ordering::SeqCst);

        if *self.cancel_purchase.lock().unwrap() {
            info!(product = %product, "Mock purchase cancelled");
            return PurchaseOutcome::new(product, PurchaseStatus::Cancelled, "Purchase was cancelled");
        }

        if *self.fail_purchase.lock().unwrap() {
            warn!(product = %product, "Mock purchase configured to fail");
            return PurchaseOutcome::failed(product, "Mock purchase failed: simulated failure");
        }

        match self.grant(product) {
            Ok((PurchaseStatus::AlreadyPurchased, expiry)) => {
                info!(product = %product, "Mock purchase: already owned");
                PurchaseOutcome::new(product, PurchaseStatus::AlreadyPurchased, "Already purchased!")
                    .with_expiry(expiry)
            }
            Ok((status, expiry)) => {
                info!(product = %product, "Mock purchase granted");
                let message = match product {
                    Product::UnlimitedUnlock => "Mock purchase successful! (Development mode)",
                    Product::PremiumSubscription => {
                        "Mock subscription activated! (Development mode)"
                    }
                };
                PurchaseOutcome::new(product, status, message).with_expiry(expiry)
            }
            Err(e) => {
                warn!(product = %product, error = %e, "Mock purchase could not be recorded");
                PurchaseOutcome::failed(product, format!("Mock purchase failed: {}", e))
            }
        }
    }

    async fn licenses(&self) -> EntitlementResult<LicenseSnapshot> {
        let ledger = self.ledger.load();
        let now = chatwarden_util::now();

        Ok(LicenseSnapshot {
            unlimited: ledger.unlimited_unlocked,
            premium_expiry: ledger.live_premium_expiry(now),
        })
    }
}
