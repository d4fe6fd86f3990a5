//! Usage quota, entitlement tiers and liveness watchdog for chatwarden
//!
//! This crate is the heart of chatwarden, containing:
//! - Usage tracking (daily free quota with local-day rollover)
//! - Tier resolution (Free -> Unlimited -> Premium)
//! - Purchase and restore flow over an entitlement backend
//! - Liveness watchdog with escalating timeouts
//! - Scoped operation monitoring

mod escalation;
mod monitor;
mod purchase;
mod tracker;
mod watchdog;

pub use escalation::*;
pub use monitor::*;
pub use purchase::*;
pub use tracker::*;
pub use watchdog::*;
