//! Persistence layer for chatwarden
//!
//! Provides:
//! - Usage record (`usage.json`, versioned, migrated on load)
//! - Purchase ledger (`purchases.json`)
//! - Audit log (append-only, SQLite)

mod audit;
mod json;
mod ledger;
mod sqlite;
mod traits;
mod usage;

pub use audit::*;
pub use json::*;
pub use ledger::*;
pub use sqlite::*;
pub use traits::*;
pub use usage::*;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Unsupported schema version {found} (newest known is {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
