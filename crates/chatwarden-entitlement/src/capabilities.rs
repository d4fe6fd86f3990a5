//! Backend capabilities model

use chatwarden_config::BackendKind;
use serde::{Deserialize, Serialize};

/// Describes what an entitlement backend does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// Which configured backend this is
    pub kind: BackendKind,

    /// Purchases move real money
    pub charges_payment: bool,

    /// Licences can be recovered from the remote store, not just the local ledger
    pub can_restore_from_store: bool,
}

impl BackendCapabilities {
    /// Local development backend
    pub fn mock() -> Self {
        Self {
            kind: BackendKind::Mock,
            charges_payment: false,
            can_restore_from_store: false,
        }
    }

    /// Remote storefront service
    pub fn storefront() -> Self {
        Self {
            kind: BackendKind::Store,
            charges_payment: true,
            can_restore_from_store: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_never_charges() {
        let caps = BackendCapabilities::mock();
        assert_eq!(caps.kind, BackendKind::Mock);
        assert!(!caps.charges_payment);
        assert!(!caps.can_restore_from_store);
    }

    #[test]
    fn storefront_charges_and_restores() {
        let caps = BackendCapabilities::storefront();
        assert!(caps.charges_payment);
        assert!(caps.can_restore_from_store);
    }
}
