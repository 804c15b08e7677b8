//! Active elections: the arena of ongoing elections.
//!
//! Elections are keyed by qualified root. A vote router maps every candidate
//! block hash to the root of the election holding it, so incoming votes find
//! their election without scanning. Elections that reach a terminal state are
//! erased from the arena in the same critical section; confirmed ones are
//! remembered in [`RecentlyConfirmed`].
//!
//! All election mutation happens under one lock. Ledger weight lookups are
//! the only calls made while it is held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orv_messages::Vote;
use orv_types::{Block, BlockHash, QualifiedRoot};
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::config::ElectionConfig;
use crate::election::{Election, ElectionContext, ElectionEvent, ElectionStatus, PublishOutcome};
use crate::vote_cache::VoteCache;
use crate::vote_info::{VoteCode, VoteSource};
use crate::{Ledger, LocalVoteHistory, OnlineReps, RecentlyConfirmed};

#[derive(Default)]
struct Inner {
    elections: HashMap<QualifiedRoot, Election>,
    router: HashMap<BlockHash, QualifiedRoot>,
    vote_cache: VoteCache,
}

pub struct ActiveElections {
    config: Arc<ElectionConfig>,
    ledger: Arc<dyn Ledger>,
    online_reps: Arc<OnlineReps>,
    history: Arc<LocalVoteHistory>,
    recently_confirmed: Arc<RecentlyConfirmed>,
    stats: Arc<Stats>,
    events: UnboundedSender<ElectionEvent>,
    inner: Mutex<Inner>,
}

impl ActiveElections {
    pub fn new(
        config: ElectionConfig,
        ledger: Arc<dyn Ledger>,
        online_reps: Arc<OnlineReps>,
        history: Arc<LocalVoteHistory>,
        recently_confirmed: Arc<RecentlyConfirmed>,
        stats: Arc<Stats>,
        events: UnboundedSender<ElectionEvent>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ledger,
            online_reps,
            history,
            recently_confirmed,
            stats,
            events,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start an election for `block`. Returns `false` if one already exists
    /// for its root, the root was recently confirmed, or the arena is full.
    pub fn insert(&self, block: Block, now: Instant) -> bool {
        let hash = block.hash();
        let root = block.qualified_root();
        if self.recently_confirmed.root_exists(&root) || self.recently_confirmed.hash_exists(&hash) {
            self.stats.inc("active", "insert_recently_confirmed");
            return false;
        }

        let weight = |a: &orv_types::Account| self.ledger.weight(a);
        let ctx = ElectionContext {
            weight: &weight,
            weights: self.online_reps.snapshot(),
            history: &self.history,
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.elections.contains_key(&root) {
            return false;
        }
        if inner.elections.len() >= self.config.max_elections {
            self.stats.inc("active", "insert_full");
            debug!(%root, "election arena full, not starting election");
            return false;
        }

        let mut election = Election::new(block, self.config.clone(), self.events.clone(), now);
        debug!(%root, %hash, "election started");
        self.stats.inc("active", "started");
        let _ = self.events.send(ElectionEvent::Started { root, winner: hash });
        Self::replay_cached(&mut election, &mut inner.vote_cache, &hash, &ctx, now);
        inner.router.insert(hash, root);
        inner.elections.insert(root, election);
        self.cleanup_terminal(inner, &root);
        true
    }

    /// Offer `block` to the election for its root.
    pub fn publish(&self, block: Block, now: Instant) -> PublishOutcome {
        let hash = block.hash();
        let root = block.qualified_root();
        let weight = |a: &orv_types::Account| self.ledger.weight(a);
        let ctx = ElectionContext {
            weight: &weight,
            weights: self.online_reps.snapshot(),
            history: &self.history,
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(election) = inner.elections.get_mut(&root) else {
            return PublishOutcome::Rejected;
        };
        if !election.contains(&hash) {
            Self::replay_cached(election, &mut inner.vote_cache, &hash, &ctx, now);
        }
        let outcome = election.publish(block, &ctx, now);
        match outcome {
            PublishOutcome::Added => {
                inner.router.insert(hash, root);
                self.stats.inc("election", "block_added");
            }
            PublishOutcome::Replaced(evicted) => {
                inner.router.remove(&evicted);
                inner.router.insert(hash, root);
                self.stats.inc("election", "block_replaced");
                debug!(%root, %evicted, %hash, "candidate replaced by heavier block");
            }
            PublishOutcome::Updated => {}
            PublishOutcome::Rejected => self.stats.inc("election", "block_rejected"),
        }
        self.cleanup_terminal(inner, &root);
        outcome
    }

    /// Apply a verified vote to every election holding one of its hashes.
    ///
    /// Hashes without an election are cached for later and reported as
    /// [`VoteCode::Indeterminate`]; hashes of recently confirmed blocks are
    /// reported as [`VoteCode::Replay`].
    pub fn vote(&self, vote: &Vote, source: VoteSource, now: Instant) -> HashMap<BlockHash, VoteCode> {
        let weight = |a: &orv_types::Account| self.ledger.weight(a);
        let ctx = ElectionContext {
            weight: &weight,
            weights: self.online_reps.snapshot(),
            history: &self.history,
        };

        let mut results = HashMap::with_capacity(vote.hashes.len());
        let mut touched = Vec::new();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        for hash in &vote.hashes {
            let election = inner
                .router
                .get(hash)
                .copied()
                .and_then(|root| inner.elections.get_mut(&root).map(|e| (root, e)));
            let code = match election {
                Some((root, election)) => {
                    touched.push(root);
                    election.vote(&vote.account, vote.timestamp, *hash, source, &ctx, now)
                }
                None if self.recently_confirmed.hash_exists(hash) => VoteCode::Replay,
                None => {
                    let rep_weight = (ctx.weight)(&vote.account);
                    if rep_weight > 0 {
                        inner
                            .vote_cache
                            .insert(*hash, vote.account, vote.timestamp, rep_weight);
                    }
                    VoteCode::Indeterminate
                }
            };
            trace!(account = %vote.account, %hash, code = code.as_str(), "vote routed");
            results.insert(*hash, code);
        }
        for root in touched {
            self.cleanup_terminal(inner, &root);
        }
        results
    }

    /// Stop and erase the election for `root`.
    pub fn erase(&self, root: &QualifiedRoot) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.elections.get_mut(root) {
            Some(election) => {
                election.stop(Instant::now());
                self.cleanup_terminal(inner, root);
                true
            }
            None => false,
        }
    }

    /// Stop every election that has outlived the election timeout.
    pub fn stop_expired(&self, now: Instant) -> usize {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let expired: Vec<QualifiedRoot> = inner
            .elections
            .iter()
            .filter(|(_, e)| e.has_expired(now))
            .map(|(root, _)| *root)
            .collect();
        for root in &expired {
            if let Some(election) = inner.elections.get_mut(root) {
                election.stop(now);
            }
            self.stats.inc("active", "expired");
            self.cleanup_terminal(inner, root);
        }
        expired.len()
    }

    /// Winners of elections due for vote solicitation, marking them as
    /// requested at `now`.
    pub fn solicitation_round(&self, now: Instant, interval: Duration) -> Vec<(QualifiedRoot, Block)> {
        let mut inner = self.inner.lock();
        inner
            .elections
            .iter_mut()
            .filter(|(_, e)| e.needs_request(now, interval))
            .map(|(root, e)| {
                e.mark_requested(now);
                (*root, e.winner().clone())
            })
            .collect()
    }

    /// Stop every election, e.g. on shutdown.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = Instant::now();
        for election in inner.elections.values_mut() {
            election.stop(now);
        }
        inner.elections.clear();
        inner.router.clear();
    }

    pub fn active(&self, root: &QualifiedRoot) -> bool {
        self.inner.lock().elections.contains_key(root)
    }

    pub fn active_hash(&self, hash: &BlockHash) -> bool {
        self.inner.lock().router.contains_key(hash)
    }

    pub fn winner(&self, root: &QualifiedRoot) -> Option<Block> {
        self.inner
            .lock()
            .elections
            .get(root)
            .map(|e| e.winner().clone())
    }

    /// Current winner of the election holding `hash` as a candidate.
    pub fn winner_for_hash(&self, hash: &BlockHash) -> Option<Block> {
        let inner = self.inner.lock();
        let root = inner.router.get(hash)?;
        inner.elections.get(root).map(|e| e.winner().clone())
    }

    pub fn status(&self, root: &QualifiedRoot) -> Option<ElectionStatus> {
        let now = Instant::now();
        self.inner.lock().elections.get(root).map(|e| e.status(now))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().elections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vote_cache_len(&self) -> usize {
        self.inner.lock().vote_cache.len()
    }

    fn replay_cached(
        election: &mut Election,
        cache: &mut VoteCache,
        hash: &BlockHash,
        ctx: &ElectionContext<'_>,
        now: Instant,
    ) {
        for cached in cache.find(hash) {
            election.vote(&cached.account, cached.timestamp, *hash, VoteSource::Cache, ctx, now);
        }
        cache.erase(hash);
    }

    fn cleanup_terminal(&self, inner: &mut Inner, root: &QualifiedRoot) {
        let terminal = inner.elections.get(root).is_some_and(|e| !e.is_ongoing());
        if !terminal {
            return;
        }
        let Some(election) = inner.elections.remove(root) else {
            return;
        };
        // Terminal elections only keep their winner, so route by root.
        inner.router.retain(|_, r| r != root);
        if election.is_confirmed() {
            self.recently_confirmed.put(*root, election.winner().hash());
            self.stats.inc("active", "confirmed");
        } else {
            self.stats.inc("active", "stopped");
        }
    }
}
