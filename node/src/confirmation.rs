//! Election event handling.
//!
//! Elections report their outcomes on an unbounded channel. This task turns
//! them into side effects. Confirmed winners are committed to the ledger and
//! published to observers. A new election or a new winner gets a local vote
//! when this node holds voting keys, and a new winner is also flooded so peers
//! converge on it. Quorum starts final voting.

use std::sync::Arc;

use orv_consensus::{ElectionEvent, ElectionStatus, Ledger, Network, VoteGenerator, Wallets};
use orv_types::{BlockHash, Root};
use orv_messages::Message;
use orv_utils::{format_duration, Stats};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

pub struct ConfirmationHandler {
    ledger: Arc<dyn Ledger>,
    network: Arc<dyn Network>,
    wallets: Arc<dyn Wallets>,
    generator: Arc<VoteGenerator>,
    final_generator: Arc<VoteGenerator>,
    stats: Arc<Stats>,
    flood_fanout: usize,
    observers: broadcast::Sender<ElectionStatus>,
}

impl ConfirmationHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn Ledger>,
        network: Arc<dyn Network>,
        wallets: Arc<dyn Wallets>,
        generator: Arc<VoteGenerator>,
        final_generator: Arc<VoteGenerator>,
        stats: Arc<Stats>,
        flood_fanout: usize,
        observer_capacity: usize,
    ) -> Self {
        let (observers, _) = broadcast::channel(observer_capacity.max(1));
        Self {
            ledger,
            network,
            wallets,
            generator,
            final_generator,
            stats,
            flood_fanout,
            observers,
        }
    }

    /// Statuses of confirmed and stopped elections. Slow subscribers lose the
    /// oldest entries.
    pub fn subscribe(&self) -> broadcast::Receiver<ElectionStatus> {
        self.observers.subscribe()
    }

    pub fn handle(&self, event: ElectionEvent) {
        match event {
            ElectionEvent::Started { root, winner } => self.vote(root.root, winner),
            ElectionEvent::Confirmed(status) => {
                let hash = status.winner.hash();
                if let Err(e) = self.ledger.commit_confirmation(&status.winner) {
                    self.stats.inc("confirmation", "commit_failed");
                    error!(%hash, error = %e, "failed to commit confirmed block");
                } else {
                    self.stats.inc("confirmation", "committed");
                    debug!(
                        %hash,
                        tally = status.tally,
                        voters = status.voter_count,
                        duration = %format_duration(status.election_duration),
                        "block confirmed"
                    );
                }
                let _ = self.observers.send(status);
            }
            ElectionEvent::Stopped(status) => {
                let _ = self.observers.send(status);
            }
            ElectionEvent::QuorumReached { root, winner } => {
                self.final_generator.add(root.root, winner);
            }
            ElectionEvent::WinnerChanged { root, previous, block } => {
                debug!(%root, %previous, winner = %block.hash(), "rebroadcasting new winner");
                self.stats.inc("confirmation", "winner_flooded");
                self.vote(root.root, block.hash());
                let peers = self.network.random_set(self.flood_fanout);
                self.network.flood(Message::Publish(block), &peers);
            }
        }
    }

    fn vote(&self, root: Root, hash: BlockHash) {
        if self.wallets.voting_reps() > 0 && self.generator.add(root, hash) {
            self.stats.inc("confirmation", "vote_queued");
        }
    }

    pub async fn run(
        self: Arc<Self>,
        mut events: UnboundedReceiver<ElectionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("confirmation handler shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
    }
}
