//! Nullable ledger: thread-safe in-memory blocks and weights for testing.

use std::collections::{HashMap, HashSet};

use orv_consensus::{ConsensusError, Ledger};
use orv_types::{Account, Block, BlockHash, QualifiedRoot, Root};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Default)]
struct State {
    weights: HashMap<Account, u128>,
    blocks: HashMap<BlockHash, Block>,
    confirmed: Vec<BlockHash>,
    /// Blocks whose dependencies are reported as unconfirmed.
    pending_dependents: HashSet<BlockHash>,
    final_votes: HashMap<QualifiedRoot, BlockHash>,
    committed: Vec<BlockHash>,
    fail_commits: bool,
}

/// An in-memory ledger.
///
/// Every block's dependents count as confirmed unless marked otherwise with
/// [`NullLedger::set_dependents_unconfirmed`].
pub struct NullLedger {
    state: Mutex<State>,
    rng: Mutex<StdRng>,
}

impl NullLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }

    pub fn set_weight(&self, account: Account, weight: u128) {
        let mut state = self.state.lock();
        if weight == 0 {
            state.weights.remove(&account);
        } else {
            state.weights.insert(account, weight);
        }
    }

    pub fn add_block(&self, block: Block) {
        self.state.lock().blocks.insert(block.hash(), block);
    }

    /// Add `block` and mark it confirmed.
    pub fn add_confirmed(&self, block: Block) {
        let hash = block.hash();
        let mut state = self.state.lock();
        state.blocks.insert(hash, block);
        if !state.confirmed.contains(&hash) {
            state.confirmed.push(hash);
        }
    }

    pub fn set_dependents_unconfirmed(&self, hash: BlockHash, unconfirmed: bool) {
        let mut state = self.state.lock();
        if unconfirmed {
            state.pending_dependents.insert(hash);
        } else {
            state.pending_dependents.remove(&hash);
        }
    }

    /// Make every following `commit_confirmation` fail.
    pub fn fail_commits(&self, fail: bool) {
        self.state.lock().fail_commits = fail;
    }

    /// Hashes committed through `commit_confirmation`, in order.
    pub fn committed(&self) -> Vec<BlockHash> {
        self.state.lock().committed.clone()
    }

    pub fn final_vote(&self, root: &QualifiedRoot) -> Option<BlockHash> {
        self.state.lock().final_votes.get(root).copied()
    }
}

impl Default for NullLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for NullLedger {
    fn weight(&self, account: &Account) -> u128 {
        self.state.lock().weights.get(account).copied().unwrap_or(0)
    }

    fn block(&self, hash: &BlockHash) -> Option<Block> {
        self.state.lock().blocks.get(hash).cloned()
    }

    fn dependents_confirmed(&self, block: &Block) -> bool {
        !self.state.lock().pending_dependents.contains(&block.hash())
    }

    fn final_vote_put(&self, root: &QualifiedRoot, hash: &BlockHash) -> bool {
        let mut state = self.state.lock();
        match state.final_votes.get(root) {
            Some(existing) => existing == hash,
            None => {
                state.final_votes.insert(*root, *hash);
                true
            }
        }
    }

    fn hash_root_random(&self) -> Option<(BlockHash, Root)> {
        let state = self.state.lock();
        if state.confirmed.is_empty() {
            return None;
        }
        let index = self.rng.lock().gen_range(0..state.confirmed.len());
        let hash = state.confirmed[index];
        state.blocks.get(&hash).map(|block| (hash, block.root()))
    }

    fn rep_weights(&self) -> Vec<(Account, u128)> {
        self.state
            .lock()
            .weights
            .iter()
            .map(|(account, weight)| (*account, *weight))
            .collect()
    }

    fn commit_confirmation(&self, block: &Block) -> Result<(), ConsensusError> {
        let mut state = self.state.lock();
        if state.fail_commits {
            return Err(ConsensusError::Commit(format!("commit of {} refused", block.hash())));
        }
        let hash = block.hash();
        state.blocks.insert(hash, block.clone());
        if !state.confirmed.contains(&hash) {
            state.confirmed.push(hash);
        }
        state.committed.push(hash);
        Ok(())
    }

    fn block_confirmed(&self, hash: &BlockHash) -> bool {
        self.state.lock().confirmed.contains(hash)
    }
}
