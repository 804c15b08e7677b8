//! The closed set of block kinds that can occupy a ledger position.
//!
//! Consensus never needs more than a handful of facts about a block: its
//! hash, the root it competes for, and the block it follows. Every kind is a
//! variant of [`Block`] and is matched exhaustively.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::{Account, BlockHash, QualifiedRoot, Root, Signature};

type Blake2b256 = Blake2b<U32>;

/// Sends funds from the chain's account to `destination`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: u128,
    pub signature: Signature,
    pub work: u64,
}

/// Pockets a pending send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub signature: Signature,
    pub work: u64,
}

/// First block of an account chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub signature: Signature,
    pub work: u64,
}

/// Changes the representative the chain delegates to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub signature: Signature,
    pub work: u64,
}

/// Universal block carrying the full account state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBlock {
    pub account: Account,
    pub previous: BlockHash,
    pub representative: Account,
    pub balance: u128,
    pub link: [u8; 32],
    pub signature: Signature,
    pub work: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
    State(StateBlock),
}

/// Discriminant of [`Block`], used for logging and stats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Send,
    Receive,
    Open,
    Change,
    State,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Open => "open",
            Self::Change => "change",
            Self::State => "state",
        }
    }
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Send(_) => BlockKind::Send,
            Block::Receive(_) => BlockKind::Receive,
            Block::Open(_) => BlockKind::Open,
            Block::Change(_) => BlockKind::Change,
            Block::State(_) => BlockKind::State,
        }
    }

    /// Content hash. Signature and work are not covered.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Blake2b256::new();
        hasher.update([self.kind() as u8]);
        match self {
            Block::Send(b) => {
                hasher.update(b.previous.as_bytes());
                hasher.update(b.destination.as_bytes());
                hasher.update(b.balance.to_be_bytes());
            }
            Block::Receive(b) => {
                hasher.update(b.previous.as_bytes());
                hasher.update(b.source.as_bytes());
            }
            Block::Open(b) => {
                hasher.update(b.source.as_bytes());
                hasher.update(b.representative.as_bytes());
                hasher.update(b.account.as_bytes());
            }
            Block::Change(b) => {
                hasher.update(b.previous.as_bytes());
                hasher.update(b.representative.as_bytes());
            }
            Block::State(b) => {
                hasher.update(b.account.as_bytes());
                hasher.update(b.previous.as_bytes());
                hasher.update(b.representative.as_bytes());
                hasher.update(b.balance.to_be_bytes());
                hasher.update(b.link);
            }
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        BlockHash::new(out)
    }

    /// Hash of the preceding block, zero for the first block of a chain.
    pub fn previous(&self) -> BlockHash {
        match self {
            Block::Send(b) => b.previous,
            Block::Receive(b) => b.previous,
            Block::Open(_) => BlockHash::ZERO,
            Block::Change(b) => b.previous,
            Block::State(b) => b.previous,
        }
    }

    /// The ledger position this block competes for.
    pub fn root(&self) -> Root {
        match self {
            Block::Open(b) => Root::from(b.account),
            Block::State(b) if b.previous.is_zero() => Root::from(b.account),
            other => Root::from(other.previous()),
        }
    }

    pub fn qualified_root(&self) -> QualifiedRoot {
        QualifiedRoot::new(self.root(), self.previous())
    }

    /// The owning account when the block carries it explicitly.
    pub fn account_field(&self) -> Option<Account> {
        match self {
            Block::Open(b) => Some(b.account),
            Block::State(b) => Some(b.account),
            Block::Send(_) | Block::Receive(_) | Block::Change(_) => None,
        }
    }

    /// Blocks this one depends on besides `previous`.
    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Block::Receive(b) => Some(b.source),
            Block::Open(b) => Some(b.source),
            Block::Send(_) | Block::Change(_) | Block::State(_) => None,
        }
    }
}
