//! Vote cache: votes for blocks that have no election yet.
//!
//! Votes can arrive before the block they vote for. They are kept here, keyed
//! by block hash, and replayed into the election once the block is inserted
//! or published. Per representative only the newest timestamp is kept.

use std::collections::{HashMap, VecDeque};

use orv_types::{Account, BlockHash};

const MAX_CACHE_SIZE: usize = 65536;
const MAX_VOTERS_PER_HASH: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedVote {
    pub account: Account,
    pub timestamp: u64,
    pub weight: u128,
}

#[derive(Default)]
struct Entry {
    votes: Vec<CachedVote>,
    tally: u128,
}

pub struct VoteCache {
    max_size: usize,
    entries: HashMap<BlockHash, Entry>,
    /// Hashes in insertion order; the front is evicted first.
    order: VecDeque<BlockHash>,
}

impl VoteCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_SIZE)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Cache a vote by `account` with the given weight for `hash`.
    ///
    /// A newer vote from the same representative replaces the older one. When
    /// a hash already has the maximum number of voters, the lightest voter is
    /// displaced only by a heavier one.
    pub fn insert(&mut self, hash: BlockHash, account: Account, timestamp: u64, weight: u128) {
        if !self.entries.contains_key(&hash) {
            while self.entries.len() >= self.max_size {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(hash);
        }
        let entry = self.entries.entry(hash).or_default();

        if let Some(existing) = entry.votes.iter_mut().find(|v| v.account == account) {
            if timestamp > existing.timestamp {
                entry.tally = entry.tally.saturating_sub(existing.weight).saturating_add(weight);
                existing.timestamp = timestamp;
                existing.weight = weight;
            }
            return;
        }

        if entry.votes.len() >= MAX_VOTERS_PER_HASH {
            let lightest = entry
                .votes
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.weight)
                .map(|(i, v)| (i, v.weight));
            match lightest {
                Some((index, lightest_weight)) if weight > lightest_weight => {
                    let removed = entry.votes.swap_remove(index);
                    entry.tally = entry.tally.saturating_sub(removed.weight);
                }
                _ => return,
            }
        }

        entry.tally = entry.tally.saturating_add(weight);
        entry.votes.push(CachedVote {
            account,
            timestamp,
            weight,
        });
    }

    /// Cached votes for `hash`.
    pub fn find(&self, hash: &BlockHash) -> Vec<CachedVote> {
        self.entries
            .get(hash)
            .map(|e| e.votes.clone())
            .unwrap_or_default()
    }

    /// Weight behind `hash` at the time its votes were cached.
    pub fn tally(&self, hash: &BlockHash) -> u128 {
        self.entries.get(hash).map_or(0, |e| e.tally)
    }

    pub fn erase(&mut self, hash: &BlockHash) -> bool {
        if self.entries.remove(hash).is_some() {
            self.order.retain(|h| h != hash);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VoteCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn make_account(seed: u8) -> Account {
        Account::new([seed; 32])
    }

    #[test]
    fn insert_and_find() {
        let mut cache = VoteCache::new();
        cache.insert(make_hash(1), make_account(1), 10, 100);
        cache.insert(make_hash(1), make_account(2), 10, 50);
        assert_eq!(cache.find(&make_hash(1)).len(), 2);
        assert_eq!(cache.tally(&make_hash(1)), 150);
        assert!(cache.find(&make_hash(2)).is_empty());
    }

    #[test]
    fn newer_vote_replaces_older() {
        let mut cache = VoteCache::new();
        cache.insert(make_hash(1), make_account(1), 10, 100);
        cache.insert(make_hash(1), make_account(1), 5, 100);
        assert_eq!(cache.find(&make_hash(1))[0].timestamp, 10);
        cache.insert(make_hash(1), make_account(1), 20, 120);
        let votes = cache.find(&make_hash(1));
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].timestamp, 20);
        assert_eq!(cache.tally(&make_hash(1)), 120);
    }

    #[test]
    fn full_hash_keeps_heaviest_voters() {
        let mut cache = VoteCache::new();
        for i in 0..MAX_VOTERS_PER_HASH as u8 {
            cache.insert(make_hash(1), make_account(i), 1, 10 + u128::from(i));
        }
        cache.insert(make_hash(1), make_account(200), 1, 5);
        assert_eq!(cache.find(&make_hash(1)).len(), MAX_VOTERS_PER_HASH);
        assert!(!cache.find(&make_hash(1)).iter().any(|v| v.account == make_account(200)));

        cache.insert(make_hash(1), make_account(201), 1, 1_000);
        let votes = cache.find(&make_hash(1));
        assert!(votes.iter().any(|v| v.account == make_account(201)));
        assert!(!votes.iter().any(|v| v.account == make_account(0)));
    }

    #[test]
    fn oldest_hash_evicted_at_capacity() {
        let mut cache = VoteCache::with_capacity(2);
        cache.insert(make_hash(1), make_account(1), 1, 1);
        cache.insert(make_hash(2), make_account(1), 1, 1);
        cache.insert(make_hash(3), make_account(1), 1, 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.find(&make_hash(1)).is_empty());
    }

    #[test]
    fn erase_removes_entry() {
        let mut cache = VoteCache::new();
        cache.insert(make_hash(1), make_account(1), 1, 1);
        assert!(cache.erase(&make_hash(1)));
        assert!(!cache.erase(&make_hash(1)));
        assert!(cache.is_empty());
    }
}
