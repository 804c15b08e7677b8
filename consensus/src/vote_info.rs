//! Per-representative vote bookkeeping and vote processing outcomes.

use std::time::Instant;

use orv_types::BlockHash;

/// The latest vote an election has recorded for one representative.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteInfo {
    /// When the vote was applied locally.
    pub time: Instant,
    pub timestamp: u64,
    pub hash: BlockHash,
}

impl VoteInfo {
    pub fn is_final(&self) -> bool {
        orv_messages::vote::is_final_timestamp(self.timestamp)
    }
}

/// Outcome of applying a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteCode {
    /// Signature did not verify.
    Invalid,
    /// Not newer than what we already have from this representative.
    Replay,
    /// Applied to at least one election.
    Vote,
    /// No election for any of the hashes.
    Indeterminate,
    /// Newer, but inside the representative's re-vote cooldown.
    Ignored,
}

impl VoteCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Replay => "replay",
            Self::Vote => "vote",
            Self::Indeterminate => "indeterminate",
            Self::Ignored => "ignored",
        }
    }

    /// Collapse per-hash outcomes into one code for the whole vote.
    ///
    /// Any applied hash makes the vote a `Vote`; otherwise replay beats
    /// ignored beats indeterminate.
    pub fn aggregate<'a>(codes: impl IntoIterator<Item = &'a VoteCode>) -> VoteCode {
        let mut result = VoteCode::Indeterminate;
        for code in codes {
            result = match (result, *code) {
                (VoteCode::Vote, _) | (_, VoteCode::Vote) => VoteCode::Vote,
                (VoteCode::Replay, _) | (_, VoteCode::Replay) => VoteCode::Replay,
                (VoteCode::Ignored, _) | (_, VoteCode::Ignored) => VoteCode::Ignored,
                (VoteCode::Invalid, _) | (_, VoteCode::Invalid) => VoteCode::Invalid,
                _ => VoteCode::Indeterminate,
            };
        }
        result
    }
}

/// Where a vote entered the node from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteSource {
    /// Received from a peer or generated locally just now.
    Live,
    /// Replayed from a cache; exempt from the re-vote cooldown.
    Cache,
}
