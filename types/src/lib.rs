//! Fundamental types for the ORV consensus node.
//!
//! This crate defines the identifiers shared across every other crate in the
//! workspace: block hashes, roots, accounts, key material, the closed set of
//! block kinds, and network handles.

pub mod account;
pub mod block;
pub mod error;
pub mod hash;
pub mod keys;
pub mod network;

pub use account::Account;
pub use block::{Block, BlockKind, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock};
pub use error::TypesError;
pub use hash::{BlockHash, QualifiedRoot, Root};
pub use keys::{KeyPair, PrivateKey, Signature};
pub use network::{ChannelId, NetworkId, NodeId};
