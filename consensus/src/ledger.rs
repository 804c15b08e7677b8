//! Ledger collaborator consumed by the consensus core.

use orv_types::{Account, Block, BlockHash, QualifiedRoot, Root};

use crate::ConsensusError;

/// Read access to account weights and blocks, plus the two write paths the
/// consensus core needs (final vote guard and confirmation commit).
///
/// Implementations must be cheap to call from inside election locks: every
/// method is expected to use a short-lived read transaction and never call
/// back into consensus components.
pub trait Ledger: Send + Sync {
    /// Voting weight currently delegated to `account`.
    fn weight(&self, account: &Account) -> u128;

    fn block(&self, hash: &BlockHash) -> Option<Block>;

    /// Whether every block `block` depends on (previous, source) is confirmed.
    fn dependents_confirmed(&self, block: &Block) -> bool;

    /// Record that a final vote was cast for `hash` on `root`.
    ///
    /// Returns `true` if the record was stored or already held the same hash,
    /// `false` if a different hash was already finalised for this root.
    fn final_vote_put(&self, root: &QualifiedRoot, hash: &BlockHash) -> bool;

    /// A random confirmed block, used for representative probing.
    fn hash_root_random(&self) -> Option<(BlockHash, Root)>;

    /// Snapshot of every representative with non-zero weight.
    fn rep_weights(&self) -> Vec<(Account, u128)>;

    /// Commit the confirmation of `block` (cement height).
    fn commit_confirmation(&self, block: &Block) -> Result<(), ConsensusError>;

    fn block_confirmed(&self, hash: &BlockHash) -> bool;
}
