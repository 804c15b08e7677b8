//! Confirmation solicitor: keeps undecided elections moving.
//!
//! Every request interval the solicitor expires stale elections, then for each
//! election whose turn has come it floods the current winner, queues a local
//! vote for it when this node holds voting keys, and asks the principal
//! representatives for votes with batched `confirm_req`s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orv_consensus::{ActiveElections, Network, RepCrawler, VoteGenerator, Wallets};
use orv_messages::{ConfirmReq, Message, CONFIRM_ACK_HASHES_MAX};
use orv_utils::Stats;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct Solicitor {
    active: Arc<ActiveElections>,
    crawler: Arc<RepCrawler>,
    network: Arc<dyn Network>,
    generator: Arc<VoteGenerator>,
    wallets: Arc<dyn Wallets>,
    stats: Arc<Stats>,
    interval: Duration,
    flood_fanout: usize,
    solicit_reps: usize,
}

impl Solicitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        active: Arc<ActiveElections>,
        crawler: Arc<RepCrawler>,
        network: Arc<dyn Network>,
        generator: Arc<VoteGenerator>,
        wallets: Arc<dyn Wallets>,
        stats: Arc<Stats>,
        interval: Duration,
        flood_fanout: usize,
        solicit_reps: usize,
    ) -> Self {
        Self {
            active,
            crawler,
            network,
            generator,
            wallets,
            stats,
            interval,
            flood_fanout,
            solicit_reps,
        }
    }

    /// Run one round. Returns how many elections were solicited.
    pub fn tick(&self, now: Instant) -> usize {
        let expired = self.active.stop_expired(now);
        if expired > 0 {
            debug!(expired, "stopped expired elections");
        }

        let due = self.active.solicitation_round(now, self.interval);
        if due.is_empty() {
            return 0;
        }

        let peers = self.network.random_set(self.flood_fanout);
        let voting = self.wallets.voting_reps() > 0;
        let mut pairs = Vec::with_capacity(due.len());
        for (root, winner) in &due {
            pairs.push((winner.hash(), root.root));
            self.network.flood(Message::Publish(winner.clone()), &peers);
            if voting {
                self.generator.add(root.root, winner.hash());
            }
        }

        let reps = self.crawler.principal_representatives(self.solicit_reps);
        for chunk in pairs.chunks(CONFIRM_ACK_HASHES_MAX) {
            for rep in &reps {
                let req = ConfirmReq::new(chunk.to_vec());
                self.network.send(rep.channel, Message::ConfirmReq(req));
                self.stats.inc("solicitor", "confirm_req");
            }
        }
        self.stats.add("solicitor", "elections", due.len() as u64);
        due.len()
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("solicitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Instant::now());
                }
            }
        }
    }
}
