//! Nullable infrastructure for deterministic testing.
//!
//! Inspired by the "A-frame architecture" pattern from RsNano.
//! The consensus core reaches its ledger, network and key custody only
//! through traits. This crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Record every outbound message for assertions
//!
//! Usage: swap real implementations for nullables in tests.

pub mod ledger;
pub mod network;
pub mod wallets;

pub use ledger::NullLedger;
pub use network::{NullNetwork, SentMessage};
pub use wallets::NullWallets;
