//! Cache of votes the local node generated, keyed by root.
//!
//! Peers asking for a vote on a root we already voted on get the cached vote
//! back instead of a freshly signed one, so repeated requests see a stable
//! answer. For a given root only votes for a single hash are kept.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use orv_messages::Vote;
use orv_types::{BlockHash, Root};
use parking_lot::Mutex;

struct LocalVote {
    root: Root,
    hash: BlockHash,
    vote: Arc<Vote>,
}

#[derive(Default)]
struct History {
    /// Insertion sequence → entry; the smallest key is the oldest.
    entries: BTreeMap<u64, LocalVote>,
    by_root: HashMap<Root, Vec<u64>>,
    next_seq: u64,
}

impl History {
    fn remove(&mut self, seq: u64) {
        if let Some(entry) = self.entries.remove(&seq) {
            if let Some(seqs) = self.by_root.get_mut(&entry.root) {
                seqs.retain(|s| *s != seq);
                if seqs.is_empty() {
                    self.by_root.remove(&entry.root);
                }
            }
        }
    }

    fn for_root(&self, root: &Root) -> impl Iterator<Item = (u64, &LocalVote)> {
        self.by_root
            .get(root)
            .into_iter()
            .flatten()
            .filter_map(|seq| self.entries.get(seq).map(|e| (*seq, e)))
    }
}

pub struct LocalVoteHistory {
    max_size: usize,
    history: Mutex<History>,
}

impl LocalVoteHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            history: Mutex::new(History::default()),
        }
    }

    /// Cache `vote` for `hash` on `root`.
    ///
    /// Votes on `root` for any other hash are dropped, as is an older vote by
    /// the same representative. A vote older than one already cached for the
    /// same representative is not added.
    pub fn add(&self, root: Root, hash: BlockHash, vote: Arc<Vote>) {
        let mut history = self.history.lock();
        self.clean(&mut history);

        let mut add_vote = true;
        let mut stale = Vec::new();
        for (seq, existing) in history.for_root(&root) {
            let same_rep = existing.vote.account == vote.account;
            if existing.hash != hash || (same_rep && existing.vote.timestamp <= vote.timestamp) {
                stale.push(seq);
            } else if same_rep {
                add_vote = false;
            }
        }
        for seq in stale {
            history.remove(seq);
        }

        if add_vote {
            let seq = history.next_seq;
            history.next_seq += 1;
            history.entries.insert(seq, LocalVote { root, hash, vote });
            history.by_root.entry(root).or_default().push(seq);
        }
    }

    pub fn erase(&self, root: &Root) {
        let mut history = self.history.lock();
        if let Some(seqs) = history.by_root.remove(root) {
            for seq in seqs {
                history.entries.remove(&seq);
            }
        }
    }

    /// Every cached vote on `root`.
    pub fn votes(&self, root: &Root) -> Vec<Arc<Vote>> {
        let history = self.history.lock();
        history.for_root(root).map(|(_, e)| e.vote.clone()).collect()
    }

    /// Cached votes on `root` for `hash`, restricted to final votes when
    /// `is_final` is set.
    pub fn votes_for(&self, root: &Root, hash: &BlockHash, is_final: bool) -> Vec<Arc<Vote>> {
        let history = self.history.lock();
        history
            .for_root(root)
            .filter(|(_, e)| e.hash == *hash && (!is_final || e.vote.is_final()))
            .map(|(_, e)| e.vote.clone())
            .collect()
    }

    pub fn exists(&self, root: &Root) -> bool {
        self.history.lock().by_root.contains_key(root)
    }

    pub fn len(&self) -> usize {
        self.history.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clean(&self, history: &mut History) {
        while history.entries.len() >= self.max_size.max(1) {
            match history.entries.keys().next().copied() {
                Some(oldest) => history.remove(oldest),
                None => break,
            }
        }
    }
}
