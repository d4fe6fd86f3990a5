//! Shared utilities for chatwarden
//!
//! This crate provides:
//! - Profile identifiers
//! - Time utilities (local "now" with mock-time support, formatting helpers)
//! - Error types
//! - Default paths for config, data, and log directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
