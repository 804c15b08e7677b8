//! Representative votes.
//!
//! Wire layout, in order:
//!
//! | field       | bytes |
//! |-------------|-------|
//! | account     | 32    |
//! | signature   | 64    |
//! | timestamp   | 8 (little endian) |
//! | duration    | 1     |
//! | hash count  | 1     |
//! | hashes      | 32 × count |
//!
//! The signature covers `blake2b("vote " ‖ hashes ‖ timestamp ‖ duration)`.

use std::time::Duration;

use orv_crypto::{sign_message, verify_signature, Blake2bHasher};
use orv_types::{Account, BlockHash, PrivateKey, Signature};
use serde::{Deserialize, Serialize};

use crate::MessageError;

/// Maximum number of block hashes a single vote may carry.
pub const CONFIRM_ACK_HASHES_MAX: usize = 255;

const VOTE_DOMAIN: &[u8] = b"vote ";
const HEADER_SIZE: usize = 32 + 64 + 8 + 1 + 1;

/// A signed statement by a representative in favour of one block per root.
///
/// Immutable once constructed. A vote is identified by
/// `(account, hash())`; see [`Vote::full_hash`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub account: Account,
    pub signature: Signature,
    /// Milliseconds since epoch, or [`Vote::TIMESTAMP_MAX`] for a final vote.
    pub timestamp: u64,
    /// Duration exponent, only meaningful for final votes.
    pub duration: u8,
    pub hashes: Vec<BlockHash>,
}

impl Vote {
    /// Timestamp sentinel marking a final vote.
    pub const TIMESTAMP_MAX: u64 = u64::MAX;
    pub const DURATION_MAX: u8 = 0x0f;
    /// Duration exponent used for non-final votes (8192 ms).
    pub const DURATION_NORMAL: u8 = 0x09;

    /// Build and sign a vote.
    pub fn new(
        account: Account,
        private: &PrivateKey,
        timestamp: u64,
        duration: u8,
        hashes: Vec<BlockHash>,
    ) -> Self {
        debug_assert!(!hashes.is_empty() && hashes.len() <= CONFIRM_ACK_HASHES_MAX);
        let mut vote = Self {
            account,
            signature: Signature::ZERO,
            timestamp,
            duration: duration.min(Self::DURATION_MAX),
            hashes,
        };
        vote.signature = sign_message(vote.hash().as_bytes(), private);
        vote
    }

    /// Build and sign a final vote.
    pub fn new_final(account: Account, private: &PrivateKey, hashes: Vec<BlockHash>) -> Self {
        Self::new(
            account,
            private,
            Self::TIMESTAMP_MAX,
            Self::DURATION_MAX,
            hashes,
        )
    }

    pub fn is_final(&self) -> bool {
        is_final_timestamp(self.timestamp)
    }

    /// How long the representative intends the vote to stand.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(1u64 << (self.duration as u32 + 4))
    }

    /// Digest covered by the signature.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Blake2bHasher::with_domain(VOTE_DOMAIN);
        for hash in &self.hashes {
            hasher.update(hash.as_bytes());
        }
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update([self.duration]);
        BlockHash::new(hasher.finalize())
    }

    /// Digest over the signed payload, signer and signature.
    pub fn full_hash(&self) -> BlockHash {
        let mut hasher = Blake2bHasher::new();
        hasher
            .update(self.hash().as_bytes())
            .update(self.account.as_bytes())
            .update(self.signature.as_bytes());
        BlockHash::new(hasher.finalize())
    }

    /// Check the signature on its own. The vote processor verifies in bulk instead.
    pub fn validate(&self) -> bool {
        verify_signature(self.hash().as_bytes(), &self.signature, &self.account)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + 32 * self.hashes.len());
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.duration);
        out.push(self.hashes.len() as u8);
        for hash in &self.hashes {
            out.extend_from_slice(hash.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < HEADER_SIZE {
            return Err(MessageError::Truncated {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let (account, rest) = bytes.split_at(32);
        let (signature, rest) = rest.split_at(64);
        let (timestamp, rest) = rest.split_at(8);
        let duration = rest[0];
        let count = rest[1] as usize;
        let rest = &rest[2..];

        if count == 0 {
            return Err(MessageError::InvalidHashCount(count));
        }
        if duration > Self::DURATION_MAX {
            return Err(MessageError::Malformed(format!(
                "duration exponent {duration} out of range"
            )));
        }
        let needed = count * 32;
        if rest.len() < needed {
            return Err(MessageError::Truncated {
                needed: HEADER_SIZE + needed,
                available: bytes.len(),
            });
        }
        if rest.len() > needed {
            return Err(MessageError::TrailingBytes(rest.len() - needed));
        }

        let hashes = rest
            .chunks_exact(32)
            .map(|chunk| {
                let mut h = [0u8; 32];
                h.copy_from_slice(chunk);
                BlockHash::new(h)
            })
            .collect();

        Ok(Self {
            account: Account::new(copy_array(account)),
            signature: Signature(copy_array(signature)),
            timestamp: u64::from_le_bytes(copy_array(timestamp)),
            duration,
            hashes,
        })
    }
}

pub fn is_final_timestamp(timestamp: u64) -> bool {
    timestamp == Vote::TIMESTAMP_MAX
}

fn copy_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}
