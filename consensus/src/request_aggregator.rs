//! Request aggregator: answers confirmation requests from peers.
//!
//! Requests are queued per channel so one chatty peer cannot starve the
//! others. For every requested `(hash, root)` a vote already in local vote
//! history is replayed as-is; anything else is handed to the normal or final
//! vote generator, which replies to the requesting channel once it has signed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use orv_messages::{Message, Vote};
use orv_types::{Block, BlockHash, ChannelId, Root};
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, trace};

use crate::config::RequestAggregatorConfig;
use crate::fair_queue::{FairQueue, Origin};
use crate::{ActiveElections, Ledger, LocalVoteHistory, Network, VoteGenerator, Wallets};

type Request = Vec<(BlockHash, Root)>;

/// Blocks left over after replaying cached votes.
#[derive(Debug, Default)]
pub struct Remaining {
    pub normal: Vec<Block>,
    pub final_votes: Vec<Block>,
}

pub struct RequestAggregator {
    config: RequestAggregatorConfig,
    ledger: Arc<dyn Ledger>,
    wallets: Arc<dyn Wallets>,
    network: Arc<dyn Network>,
    history: Arc<LocalVoteHistory>,
    active: Arc<ActiveElections>,
    generator: Arc<VoteGenerator>,
    final_generator: Arc<VoteGenerator>,
    stats: Arc<Stats>,
    queue: Mutex<FairQueue<Request, ()>>,
    notify: Notify,
    stopped: AtomicBool,
}

impl RequestAggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RequestAggregatorConfig,
        ledger: Arc<dyn Ledger>,
        wallets: Arc<dyn Wallets>,
        network: Arc<dyn Network>,
        history: Arc<LocalVoteHistory>,
        active: Arc<ActiveElections>,
        generator: Arc<VoteGenerator>,
        final_generator: Arc<VoteGenerator>,
        stats: Arc<Stats>,
    ) -> Self {
        let max_queue = config.max_queue;
        let alive_network = network.clone();
        let queue = FairQueue::new(move |_| max_queue, |_| 1)
            .with_alive_query(move |channel| alive_network.is_alive(channel));
        Self {
            config,
            ledger,
            wallets,
            network,
            history,
            active,
            generator,
            final_generator,
            stats,
            queue: Mutex::new(queue),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Queue a confirmation request received on `channel`. Returns `false` if
    /// it was dropped.
    pub fn request(&self, request: Request, channel: ChannelId) -> bool {
        if self.stopped.load(Ordering::Relaxed) || request.is_empty() {
            return false;
        }
        if self.wallets.voting_reps() == 0 {
            self.stats.inc("request_aggregator", "no_voting_reps");
            return false;
        }
        let added = self.queue.lock().push(request, Origin::new((), channel));
        if added {
            self.stats.inc("request_aggregator", "accepted");
            self.notify.notify_one();
        } else {
            self.stats.inc("request_aggregator", "overfill");
            trace!(%channel, "confirmation request dropped");
        }
        added
    }

    /// Handle one batch of queued requests. Returns how many were taken.
    pub fn process_batch(&self) -> usize {
        let batch = self.queue.lock().next_batch(self.config.batch_size.max(1));
        for (request, origin) in &batch {
            let Some(channel) = origin.channel else {
                continue;
            };
            self.process(request, channel);
        }
        batch.len()
    }

    pub fn drain(&self) {
        while self.process_batch() > 0 {}
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.queue.lock().clear();
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("request aggregator shutting down");
                    self.stop();
                    break;
                }
                _ = self.notify.notified() => {
                    while self.process_batch() > 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
    }

    fn process(&self, request: &Request, channel: ChannelId) {
        let mut request = request.clone();
        request.sort_by(|a, b| a.0.cmp(&b.0));
        request.dedup_by(|a, b| a.0 == b.0);

        let remaining = self.aggregate(&request, channel);
        if !remaining.normal.is_empty() {
            let generated = self.generator.generate(&remaining.normal, channel);
            self.stats.add(
                "requests",
                "requests_cannot_vote",
                (remaining.normal.len() - generated) as u64,
            );
        }
        if !remaining.final_votes.is_empty() {
            let generated = self.final_generator.generate(&remaining.final_votes, channel);
            self.stats.add(
                "requests",
                "requests_cannot_vote",
                (remaining.final_votes.len() - generated) as u64,
            );
        }
    }

    /// Reply with cached votes and sort the rest into blocks needing a
    /// normal or a final vote.
    pub fn aggregate(&self, request: &[(BlockHash, Root)], channel: ChannelId) -> Remaining {
        let mut remaining = Remaining::default();
        let mut cached_votes: Vec<Arc<Vote>> = Vec::new();
        let mut cached_hashes: HashSet<BlockHash> = HashSet::new();

        for (hash, root) in request {
            if cached_hashes.contains(hash) {
                continue;
            }

            let found = self.history.votes_for(root, hash, false);
            if !found.is_empty() {
                for vote in found {
                    cached_hashes.extend(vote.hashes.iter().copied());
                    cached_votes.push(vote);
                }
                continue;
            }

            let (block, confirmed) = match self.active.winner_for_hash(hash) {
                Some(winner) => (Some(winner), false),
                None => match self.ledger.block(hash) {
                    Some(block) => (Some(block), self.ledger.block_confirmed(hash)),
                    None => (None, false),
                },
            };
            let Some(block) = block else {
                self.stats.inc("requests", "requests_unknown");
                continue;
            };

            if block.hash() != *hash {
                // Let the peer know about the block we consider the winner.
                self.network.send(channel, Message::Publish(block.clone()));
            }
            if confirmed {
                remaining.final_votes.push(block);
            } else {
                remaining.normal.push(block);
            }
        }

        let mut seen = HashSet::new();
        cached_votes.retain(|vote| seen.insert(vote.full_hash()));
        for vote in &cached_votes {
            self.network
                .send(channel, Message::ConfirmAck((**vote).clone()));
        }
        self.stats
            .add("requests", "requests_cached_hashes", cached_hashes.len() as u64);
        self.stats
            .add("requests", "requests_cached_votes", cached_votes.len() as u64);
        if !cached_votes.is_empty() {
            debug!(%channel, votes = cached_votes.len(), "replied with cached votes");
        }
        remaining
    }
}
