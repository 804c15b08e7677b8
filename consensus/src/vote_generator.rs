//! Local vote generation.
//!
//! Two generators run side by side: one for normal votes and one for final
//! votes. Candidates `(root, hash)` are batched into votes of up to
//! [`CONFIRM_ACK_HASHES_MAX`] hashes with at most one hash per root. A batch
//! goes out as soon as it is full, otherwise after the generation delay.
//! Explicit requests from peers are answered from the same signing path and
//! sent back to the requesting channel only. A candidate already voted for
//! inside the spacing interval is answered with the cached vote, never a
//! newly signed one.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use orv_messages::vote::CONFIRM_ACK_HASHES_MAX;
use orv_messages::{Message, Vote};
use orv_types::{Block, BlockHash, ChannelId, Root};
use orv_utils::{milliseconds_since_epoch, Stats};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, trace};

use crate::config::VoteGeneratorConfig;
use crate::vote_spacing::Spacing;
use crate::{Ledger, LocalVoteHistory, Network, VoteProcessor, VoteSpacing, Wallets};

/// Peers a generated vote is flooded to, besides the local vote processor.
const BROADCAST_FANOUT: usize = 32;

type Candidate = (Root, BlockHash);

/// One round of selected candidates.
#[derive(Default)]
struct Batch {
    /// Candidates that need a newly signed vote, at most one per root.
    roots: Vec<Root>,
    hashes: Vec<BlockHash>,
    /// Votes signed earlier inside the spacing interval, sent again as is.
    replays: Vec<Arc<Vote>>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.hashes.is_empty() && self.replays.is_empty()
    }
}

#[derive(Default)]
struct State {
    candidates: VecDeque<Candidate>,
    requests: VecDeque<(Vec<Candidate>, ChannelId)>,
    /// Set when a partial batch above the threshold was held back one delay.
    deferred: bool,
}

pub struct VoteGenerator {
    config: VoteGeneratorConfig,
    is_final: bool,
    ledger: Arc<dyn Ledger>,
    wallets: Arc<dyn Wallets>,
    network: Arc<dyn Network>,
    history: Arc<LocalVoteHistory>,
    vote_processor: Arc<VoteProcessor>,
    stats: Arc<Stats>,
    state: Mutex<State>,
    spacing: Mutex<VoteSpacing>,
    notify: Notify,
}

impl VoteGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VoteGeneratorConfig,
        is_final: bool,
        ledger: Arc<dyn Ledger>,
        wallets: Arc<dyn Wallets>,
        network: Arc<dyn Network>,
        history: Arc<LocalVoteHistory>,
        vote_processor: Arc<VoteProcessor>,
        stats: Arc<Stats>,
    ) -> Self {
        let spacing = VoteSpacing::new(config.spacing());
        Self {
            config,
            is_final,
            ledger,
            wallets,
            network,
            history,
            vote_processor,
            stats,
            state: Mutex::new(State::default()),
            spacing: Mutex::new(spacing),
            notify: Notify::new(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Queue `hash` on `root` for a broadcast vote. Returns `false` if the
    /// block is not eligible for a vote.
    pub fn add(&self, root: Root, hash: BlockHash) -> bool {
        if !self.should_vote(&root, &hash) {
            self.stats.inc("vote_generator", "candidate_rejected");
            return false;
        }
        let full = {
            let mut state = self.state.lock();
            state.candidates.push_back((root, hash));
            state.candidates.len() >= CONFIRM_ACK_HASHES_MAX
        };
        self.stats.inc("vote_generator", "candidate");
        if full {
            self.notify.notify_one();
        }
        true
    }

    /// Queue a reply to `channel` covering `blocks`. Blocks whose dependents
    /// are not yet confirmed are skipped. Returns the number of blocks that
    /// will be voted on.
    pub fn generate(&self, blocks: &[Block], channel: ChannelId) -> usize {
        let candidates: Vec<Candidate> = blocks
            .iter()
            .filter(|block| self.ledger.dependents_confirmed(block))
            .map(|block| (block.root(), block.hash()))
            .collect();
        let count = candidates.len();
        {
            let mut state = self.state.lock();
            state.requests.push_back((candidates, channel));
            while state.requests.len() > self.config.max_requests.max(1) {
                state.requests.pop_front();
                self.stats.inc("vote_generator", "generator_replies_discarded");
            }
        }
        self.notify.notify_one();
        count
    }

    /// Run one round of the generation loop: answer pending requests, then
    /// broadcast candidates if a batch is due.
    pub fn process(&self, now: Instant) {
        self.process_inner(false, now);
    }

    /// Broadcast every queued candidate and answer every request now.
    pub fn flush(&self, now: Instant) {
        self.process_inner(true, now);
    }

    pub fn candidates_len(&self) -> usize {
        self.state.lock().candidates.len()
    }

    pub fn requests_len(&self) -> usize {
        self.state.lock().requests.len()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let delay = self.config.delay();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!(is_final = self.is_final, "vote generator shutting down");
                    break;
                }
                _ = self.notify.notified() => self.process(Instant::now()),
                _ = tokio::time::sleep(delay) => self.process(Instant::now()),
            }
        }
    }

    fn should_vote(&self, root: &Root, hash: &BlockHash) -> bool {
        let Some(block) = self.ledger.block(hash) else {
            trace!(%hash, "no block to vote for");
            return false;
        };
        debug_assert_eq!(block.root(), *root);
        if !self.ledger.dependents_confirmed(&block) {
            return false;
        }
        !self.is_final || self.ledger.final_vote_put(&block.qualified_root(), hash)
    }

    fn process_inner(&self, force: bool, now: Instant) {
        loop {
            let request = self.state.lock().requests.pop_front();
            match request {
                Some((candidates, channel)) => self.reply(candidates, channel, now),
                None => break,
            }
        }
        while let Some(batch) = self.take_batch(force, now) {
            self.broadcast(batch, now);
        }
    }

    /// Next batch of spacing-eligible candidates, one per root, if one is due.
    fn take_batch(&self, force: bool, now: Instant) -> Option<Batch> {
        let mut state = self.state.lock();
        let len = state.candidates.len();
        if len == 0 {
            state.deferred = false;
            return None;
        }
        if !force && len < CONFIRM_ACK_HASHES_MAX && len >= self.config.threshold && !state.deferred {
            // Close to a full batch: give it one more delay to fill up.
            state.deferred = true;
            return None;
        }
        state.deferred = false;
        Some(self.select(&mut state.candidates, now))
    }

    fn broadcast(&self, batch: Batch, now: Instant) {
        if batch.is_empty() {
            return;
        }
        for vote in &batch.replays {
            let peers = self.network.random_set(BROADCAST_FANOUT);
            self.network
                .flood(Message::ConfirmAck((**vote).clone()), &peers);
        }
        for vote in self.vote(&batch.roots, &batch.hashes, now) {
            let peers = self.network.random_set(BROADCAST_FANOUT);
            self.network
                .flood(Message::ConfirmAck((*vote).clone()), &peers);
            self.vote_processor.vote(vote, ChannelId::LOOPBACK);
            self.stats.inc("vote_generator", "generator_broadcasts");
        }
    }

    fn reply(&self, candidates: Vec<Candidate>, channel: ChannelId, now: Instant) {
        let mut pending: VecDeque<Candidate> = candidates.into();
        while !pending.is_empty() {
            let batch = self.select(&mut pending, now);
            if batch.is_empty() {
                continue;
            }
            self.stats
                .add("requests", "requests_generated_hashes", batch.hashes.len() as u64);
            let fresh = self.vote(&batch.roots, &batch.hashes, now);
            for vote in batch.replays.iter().chain(&fresh) {
                self.network
                    .send(channel, Message::ConfirmAck((**vote).clone()));
                self.stats.inc("requests", "requests_generated_votes");
            }
        }
        self.stats.inc("vote_generator", "generator_replies");
    }

    fn select(&self, queue: &mut VecDeque<Candidate>, now: Instant) -> Batch {
        let spacing = self.spacing.lock();
        let mut batch = Batch::default();
        while batch.hashes.len() < CONFIRM_ACK_HASHES_MAX {
            let Some((root, hash)) = queue.pop_front() else {
                break;
            };
            if batch.roots.contains(&root) {
                continue;
            }
            match spacing.check(&root, &hash, now) {
                Spacing::Free => {
                    batch.roots.push(root);
                    batch.hashes.push(hash);
                }
                Spacing::Repeat => {
                    let cached = self.history.votes_for(&root, &hash, self.is_final);
                    if cached.is_empty() {
                        self.stats.inc("vote_generator", "generator_spacing");
                    }
                    for vote in cached {
                        if !batch.replays.iter().any(|v| Arc::ptr_eq(v, &vote)) {
                            self.stats.inc("vote_generator", "generator_replay");
                            batch.replays.push(vote);
                        }
                    }
                }
                Spacing::Blocked => self.stats.inc("vote_generator", "generator_spacing"),
            }
        }
        batch
    }

    /// Sign `hashes` with every local representative key and record the
    /// votes in history and spacing.
    fn vote(&self, roots: &[Root], hashes: &[BlockHash], now: Instant) -> Vec<Arc<Vote>> {
        debug_assert_eq!(roots.len(), hashes.len());
        let mut votes = Vec::new();
        if hashes.is_empty() {
            return votes;
        }
        self.wallets.foreach_representative(&mut |account, private| {
            let vote = if self.is_final {
                Vote::new_final(*account, private, hashes.to_vec())
            } else {
                Vote::new(
                    *account,
                    private,
                    milliseconds_since_epoch(),
                    Vote::DURATION_NORMAL,
                    hashes.to_vec(),
                )
            };
            votes.push(Arc::new(vote));
        });

        let mut spacing = self.spacing.lock();
        for vote in &votes {
            for (root, hash) in roots.iter().zip(hashes) {
                self.history.add(*root, *hash, vote.clone());
                spacing.flag(*root, *hash, now);
            }
        }
        if !votes.is_empty() {
            debug!(
                is_final = self.is_final,
                hashes = hashes.len(),
                reps = votes.len(),
                "generated votes"
            );
        }
        votes
    }
}
