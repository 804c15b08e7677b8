//! Cryptographic primitives for the ORV consensus node.
//!
//! - **Ed25519** for vote signing and verification, single or batched
//! - **Blake2b-256** for vote and block digests

pub mod batch;
pub mod hash;
pub mod keys;
pub mod sign;

pub use batch::{verify_batch, SignatureCheck};
pub use hash::{blake2b_256, blake2b_256_multi, Blake2bHasher};
pub use keys::{account_from_private, generate_keypair, keypair_from_seed};
pub use sign::{sign_message, verify_signature};
