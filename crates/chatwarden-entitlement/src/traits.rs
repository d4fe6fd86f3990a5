//! Entitlement backend traits

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::BackendCapabilities;

/// Errors from entitlement backend operations
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storefront error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Ledger error: {0}")]
    Ledger(#[from] chatwarden_store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;

/// Purchasable add-ons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    /// One-time permanent unlock
    UnlimitedUnlock,
    /// Time-boxed subscription
    PremiumSubscription,
}

impl Product {
    /// Store product identifier
    pub fn id(&self) -> &'static str {
        match self {
            Product::UnlimitedUnlock => "unlimited_unlock",
            Product::PremiumSubscription => "premium_subscription",
        }
    }

    /// Display price
    pub fn price(&self) -> &'static str {
        match self {
            Product::UnlimitedUnlock => "$0.99",
            Product::PremiumSubscription => "$9.99/month",
        }
    }

    /// Subscription period, `None` for one-time purchases
    pub fn period_days(&self) -> Option<u32> {
        match self {
            Product::UnlimitedUnlock => None,
            Product::PremiumSubscription => Some(30),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Product {
    type Err = EntitlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unlimited_unlock" | "unlimited" => Ok(Product::UnlimitedUnlock),
            "premium_subscription" | "premium" => Ok(Product::PremiumSubscription),
            other => Err(EntitlementError::UnknownProduct(other.to_string())),
        }
    }
}

/// Result of a purchase request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Succeeded,
    AlreadyPurchased,
    Cancelled,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Succeeded => "succeeded",
            PurchaseStatus::AlreadyPurchased => "already_purchased",
            PurchaseStatus::Cancelled => "cancelled",
            PurchaseStatus::Failed => "failed",
        }
    }
}

/// Purchase status plus a user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub product: Product,
    pub status: PurchaseStatus,
    pub message: String,
    /// When the owned subscription ends, as the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Local>>,
}

impl PurchaseOutcome {
    pub fn new(product: Product, status: PurchaseStatus, message: impl Into<String>) -> Self {
        Self {
            product,
            status,
            message: message.into(),
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry: Option<DateTime<Local>>) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn failed(product: Product, message: impl Into<String>) -> Self {
        Self::new(product, PurchaseStatus::Failed, message)
    }

    /// The entitlement is owned after this outcome
    pub fn success(&self) -> bool {
        matches!(
            self.status,
            PurchaseStatus::Succeeded | PurchaseStatus::AlreadyPurchased
        )
    }
}

/// Licences the backend currently grants
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSnapshot {
    pub unlimited: bool,
    pub premium_expiry: Option<DateTime<Local>>,
}

/// Entitlement backend - implemented by the mock and remote storefronts
#[async_trait]
pub trait EntitlementBackend: Send + Sync {
    /// Get the capabilities of this backend
    fn capabilities(&self) -> &BackendCapabilities;

    /// Purchase a product. Transport problems are reported as
    /// [`PurchaseStatus::Failed`] outcomes, never as errors.
    async fn purchase(&self, product: Product) -> PurchaseOutcome;

    /// Licences currently held
    async fn licenses(&self) -> EntitlementResult<LicenseSnapshot>;

    /// Optional: check if the backend is reachable
    fn is_healthy(&self) -> bool {
        true
    }
}
