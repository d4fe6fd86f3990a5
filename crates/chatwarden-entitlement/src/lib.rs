//! Entitlement backend interfaces for chatwarden
//!
//! This crate defines the boundary between the usage core and whatever records
//! purchases: a local mock storefront for development, or a remote storefront
//! service. Selection happens from configuration in [`build_backend`].

mod capabilities;
mod http;
mod mock;
mod traits;

pub use capabilities::*;
pub use http::*;
pub use mock::*;
pub use traits::*;

use chatwarden_config::{BackendKind, EntitlementSettings};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Environment variable holding an optional bearer token for the storefront
pub const STORE_TOKEN_ENV: &str = "CHATWARDEN_STORE_TOKEN";

/// Build the backend named by `settings`, recording purchases in `ledger_path`
pub fn build_backend(
    settings: &EntitlementSettings,
    ledger_path: &Path,
) -> EntitlementResult<Arc<dyn EntitlementBackend>> {
    match settings.backend {
        BackendKind::Mock => {
            info!(ledger = %ledger_path.display(), "Using mock storefront (no payment)");
            Ok(Arc::new(MockStorefront::new(ledger_path)))
        }
        BackendKind::Store => {
            let url = settings.store_url.as_deref().ok_or_else(|| {
                EntitlementError::Config("store backend requires entitlement.store_url".into())
            })?;

            let mut backend = HttpStorefront::new(url, settings.request_timeout, ledger_path)?;
            if let Ok(token) = std::env::var(STORE_TOKEN_ENV)
                && !token.is_empty()
            {
                backend = backend.with_token(token);
            }

            info!(url = %url, "Using storefront service");
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn builds_mock_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let backend =
            build_backend(&EntitlementSettings::default(), &dir.path().join("purchases.json"))
                .unwrap();
        assert_eq!(backend.capabilities().kind, BackendKind::Mock);
        assert!(!backend.capabilities().charges_payment);
    }

    #[test]
    fn store_without_url_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EntitlementSettings {
            backend: BackendKind::Store,
            store_url: None,
            request_timeout: Duration::from_secs(5),
        };
        let result = build_backend(&settings, &dir.path().join("purchases.json"));
        assert!(matches!(result, Err(EntitlementError::Config(_))));
    }

    #[test]
    fn builds_storefront() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EntitlementSettings {
            backend: BackendKind::Store,
            store_url: Some("https://store.example.com".into()),
            request_timeout: Duration::from_secs(5),
        };
        let backend = build_backend(&settings, &dir.path().join("purchases.json")).unwrap();
        assert_eq!(backend.capabilities().kind, BackendKind::Store);
        assert!(backend.capabilities().can_restore_from_store);
    }
}
