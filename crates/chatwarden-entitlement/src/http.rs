//! Remote storefront client

use async_trait::async_trait;
use chatwarden_store::{LedgerFile, PurchaseEntry, PurchaseLedger};
use chrono::{DateTime, Duration as ChronoDuration, Local};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    BackendCapabilities, EntitlementBackend, EntitlementError, EntitlementResult, LicenseSnapshot,
    Product, PurchaseOutcome, PurchaseStatus,
};

/// Storefront service reached over HTTP(S)
///
/// Endpoints, relative to the configured base URL:
/// - `POST /v1/purchases` with `{"product_id": ...}`
/// - `GET /v1/licenses`
pub struct HttpStorefront {
    capabilities: BackendCapabilities,
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    token: Option<String>,
    ledger: LedgerFile,
}

#[derive(Debug, Serialize)]
struct PurchaseRequest<'a> {
    product_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct PurchaseResponse {
    status: String,
    #[serde(default)]
    store_id: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LicensesResponse {
    #[serde(default)]
    unlimited: bool,
    #[serde(default)]
    premium_expiry: Option<String>,
}

impl HttpStorefront {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        ledger_path: impl AsRef<Path>,
    ) -> EntitlementResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            capabilities: BackendCapabilities::storefront(),
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            token: None,
            ledger: LedgerFile::new(ledger_path.as_ref()),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn headers(&self) -> EntitlementResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| EntitlementError::Config("store token is not a valid header".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    async fn request_purchase(&self, product: Product) -> EntitlementResult<PurchaseResponse> {
        let url = format!("{}/v1/purchases", self.base_url);
        debug!(url = %url, product = %product, "Requesting purchase");

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&PurchaseRequest {
                product_id: product.id(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EntitlementError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    /// Mirror an owned product into the ledger. For the subscription, returns
    /// the expiry the storefront reported, falling back to the ledger's for a
    /// subscription that was already owned.
    fn record(
        &self,
        product: Product,
        status: PurchaseStatus,
        response: &PurchaseResponse,
    ) -> Option<DateTime<Local>> {
        let now = chatwarden_util::now();
        let expiry = response
            .expiry
            .as_deref()
            .and_then(chatwarden_util::parse_local_timestamp);

        let result = self.ledger.update(|ledger| match product {
            Product::UnlimitedUnlock => {
                ledger.unlimited_unlocked = true;
                if status == PurchaseStatus::Succeeded {
                    ledger.purchases.push(entry(product, now, "completed", None, response));
                }
            }
            Product::PremiumSubscription => {
                let expiry = expiry.or_else(|| {
                    (status == PurchaseStatus::Succeeded).then(|| {
                        now + ChronoDuration::days(i64::from(product.period_days().unwrap_or(30)))
                    })
                });
                if let Some(expiry) = expiry {
                    ledger.premium_active = true;
                    ledger.premium_expiry = Some(expiry);
                }
                if status == PurchaseStatus::Succeeded {
                    ledger.purchases.push(entry(product, now, "active", expiry, response));
                }
            }
        });

        let ledger = match result {
            Ok(ledger) => Some(ledger),
            Err(e) => {
                warn!(product = %product, error = %e, "Failed to record purchase in ledger");
                None
            }
        };

        match product {
            Product::UnlimitedUnlock => None,
            Product::PremiumSubscription => match expiry {
                Some(expiry) => Some(expiry),
                None if status == PurchaseStatus::AlreadyPurchased => {
                    ledger.and_then(|ledger| ledger.live_premium_expiry(now))
                }
                None => None,
            },
        }
    }

    fn sync_ledger(&self, snapshot: &LicenseSnapshot) {
        let result = self.ledger.update(|ledger: &mut PurchaseLedger| {
            ledger.unlimited_unlocked |= snapshot.unlimited;
            ledger.premium_active = snapshot.premium_expiry.is_some();
            if snapshot.premium_expiry.is_some() {
                ledger.premium_expiry = snapshot.premium_expiry;
            }
        });

        if let Err(e) = result {
            warn!(error = %e, "Failed to sync purchase ledger with storefront");
        }
    }
}

fn entry(
    product: Product,
    now: DateTime<Local>,
    status: &str,
    expiry: Option<DateTime<Local>>,
    response: &PurchaseResponse,
) -> PurchaseEntry {
    PurchaseEntry {
        product_id: product.id().to_string(),
        timestamp: now,
        price: product.price().to_string(),
        status: status.to_string(),
        expiry,
        store_id: response.store_id.clone(),
        note: None,
    }
}

fn map_status(raw: &str) -> PurchaseStatus {
    match raw {
        "succeeded" => PurchaseStatus::Succeeded,
        "already_purchased" => PurchaseStatus::AlreadyPurchased,
        "not_purchased" | "cancelled" => PurchaseStatus::Cancelled,
        _ => PurchaseStatus::Failed,
    }
}

#[async_trait]
impl EntitlementBackend for HttpStorefront {
    fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    async fn purchase(&self, product: Product) -> PurchaseOutcome {
        let response = match self.request_purchase(product).await {
            Ok(response) => response,
            Err(e) => {
                warn!(product = %product, error = %e, "Storefront purchase request failed");
                return PurchaseOutcome::failed(product, format!("Purchase error: {}", e));
            }
        };

        let status = map_status(&response.status);
        info!(product = %product, status = status.as_str(), "Storefront purchase finished");

        let expiry = if matches!(
            status,
            PurchaseStatus::Succeeded | PurchaseStatus::AlreadyPurchased
        ) {
            self.record(product, status, &response)
        } else {
            None
        };

        let message = match status {
            PurchaseStatus::Succeeded => "Purchase successful!".to_string(),
            PurchaseStatus::AlreadyPurchased => "Already purchased!".to_string(),
            PurchaseStatus::Cancelled => "Purchase was cancelled".to_string(),
            PurchaseStatus::Failed => response
                .message
                .clone()
                .unwrap_or_else(|| format!("Purchase failed: {}", response.status)),
        };

        PurchaseOutcome::new(product, status, message).with_expiry(expiry)
    }

    async fn licenses(&self) -> EntitlementResult<LicenseSnapshot> {
        let url = format!("{}/v1/licenses", self.base_url);
        debug!(url = %url, "Fetching licences");

        let response = self.client.get(&url).headers(self.headers()?).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EntitlementError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: LicensesResponse = response.json().await?;
        let now = chatwarden_util::now();
        let snapshot = LicenseSnapshot {
            unlimited: body.unlimited,
            premium_expiry: body
                .premium_expiry
                .as_deref()
                .and_then(chatwarden_util::parse_local_timestamp)
                .filter(|expiry| *expiry > now),
        };

        self.sync_ledger(&snapshot);
        Ok(snapshot)
    }
}
