//! Account identifiers.
//!
//! An account is the Ed25519 public key that owns a chain of blocks. The
//! textual form is the hex-encoded key behind an `orv_` prefix.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::decode_32;
use crate::TypesError;

/// A 32-byte account public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Account {
    /// Prefix of the textual account encoding.
    pub const PREFIX: &'static str = "orv_";

    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Encode as `orv_<hex>`.
    pub fn encode(&self) -> String {
        format!("{}{}", Self::PREFIX, hex::encode(self.0))
    }

    /// Parse the `orv_<hex>` form produced by [`Account::encode`].
    pub fn decode(s: &str) -> Result<Self, TypesError> {
        let body = s
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| TypesError::InvalidAccount(s.to_string()))?;
        decode_32(body).map(Self)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({}{}…)", Self::PREFIX, hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
