//! Shared wiring for the consensus integration tests: every component built
//! on top of the nullable ledger, network and wallets.

#![allow(dead_code)]

use std::sync::Arc;

use orv_consensus::{
    ActiveElections, ConsensusConfig, ElectionEvent, LocalVoteHistory, OnlineReps,
    RecentlyConfirmed, RepCrawler, RepTiers, RequestAggregator, VoteGenerator, VoteProcessor,
};
use orv_crypto::keypair_from_seed;
use orv_messages::Vote;
use orv_nullables::{NullLedger, NullNetwork, NullWallets};
use orv_types::{Account, Block, BlockHash, KeyPair, NetworkId, Signature, StateBlock};
use orv_utils::Stats;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub struct Harness {
    pub config: ConsensusConfig,
    pub ledger: Arc<NullLedger>,
    pub network: Arc<NullNetwork>,
    pub wallets: Arc<NullWallets>,
    pub stats: Arc<Stats>,
    pub online_reps: Arc<OnlineReps>,
    pub history: Arc<LocalVoteHistory>,
    pub recently_confirmed: Arc<RecentlyConfirmed>,
    pub active: Arc<ActiveElections>,
    pub rep_tiers: Arc<RepTiers>,
    pub vote_processor: Arc<VoteProcessor>,
    pub generator: Arc<VoteGenerator>,
    pub final_generator: Arc<VoteGenerator>,
    pub aggregator: Arc<RequestAggregator>,
    pub crawler: Arc<RepCrawler>,
    pub events: UnboundedReceiver<ElectionEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ConsensusConfig::for_network(NetworkId::Dev))
    }

    pub fn with_config(config: ConsensusConfig) -> Self {
        orv_utils::init_tracing();
        let ledger = Arc::new(NullLedger::new());
        let network = Arc::new(NullNetwork::with_channels(8));
        let wallets = Arc::new(NullWallets::new());
        let stats = Arc::new(Stats::new());
        let (events_tx, events) = mpsc::unbounded_channel();

        let online_reps = Arc::new(OnlineReps::new(
            config.online_reps.clone(),
            config.election.online_weight_minimum,
            config.election.quorum_percent,
            ledger.clone(),
            stats.clone(),
        ));
        let history = Arc::new(LocalVoteHistory::new(config.vote_generator.history_max_size));
        let recently_confirmed = Arc::new(RecentlyConfirmed::new(
            config.election.recently_confirmed_size,
        ));
        let active = Arc::new(ActiveElections::new(
            config.election.clone(),
            ledger.clone(),
            online_reps.clone(),
            history.clone(),
            recently_confirmed.clone(),
            stats.clone(),
            events_tx,
        ));
        let rep_tiers = Arc::new(RepTiers::new(
            config.vote_processor.clone(),
            ledger.clone(),
            online_reps.clone(),
        ));
        let vote_processor = Arc::new(VoteProcessor::new(
            config.vote_processor.clone(),
            active.clone(),
            online_reps.clone(),
            rep_tiers.clone(),
            network.clone(),
            stats.clone(),
        ));
        let generator = Arc::new(VoteGenerator::new(
            config.vote_generator.clone(),
            false,
            ledger.clone(),
            wallets.clone(),
            network.clone(),
            history.clone(),
            vote_processor.clone(),
            stats.clone(),
        ));
        let final_generator = Arc::new(VoteGenerator::new(
            config.vote_generator.clone(),
            true,
            ledger.clone(),
            wallets.clone(),
            network.clone(),
            history.clone(),
            vote_processor.clone(),
            stats.clone(),
        ));
        let aggregator = Arc::new(RequestAggregator::new(
            config.request_aggregator.clone(),
            ledger.clone(),
            wallets.clone(),
            network.clone(),
            history.clone(),
            active.clone(),
            generator.clone(),
            final_generator.clone(),
            stats.clone(),
        ));
        let crawler = Arc::new(RepCrawler::new(
            config.rep_crawler.clone(),
            ledger.clone(),
            network.clone(),
            online_reps.clone(),
            recently_confirmed.clone(),
            stats.clone(),
        ));

        Self {
            config,
            ledger,
            network,
            wallets,
            stats,
            online_reps,
            history,
            recently_confirmed,
            active,
            rep_tiers,
            vote_processor,
            generator,
            final_generator,
            aggregator,
            crawler,
            events,
        }
    }

    /// A representative derived from `seed`, given `weight` in the ledger.
    pub fn rep(&self, seed: u8, weight: u128) -> KeyPair {
        let pair = keypair_from_seed(&[seed; 32]);
        self.ledger.set_weight(pair.account, weight);
        pair
    }

    pub fn drain_events(&mut self) -> Vec<ElectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn make_account(seed: u8) -> Account {
    Account::new([seed; 32])
}

/// A state block on `account_seed`'s chain after `previous`, forking on
/// `balance`.
pub fn make_block(account_seed: u8, previous: u8, balance: u128) -> Block {
    Block::State(StateBlock {
        account: make_account(account_seed),
        previous: BlockHash::new([previous; 32]),
        representative: make_account(0xEE),
        balance,
        link: [0; 32],
        signature: Signature::ZERO,
        work: 0,
    })
}

pub fn sign_vote(rep: &KeyPair, timestamp: u64, hashes: Vec<BlockHash>) -> Arc<Vote> {
    Arc::new(Vote::new(
        rep.account,
        &rep.private,
        timestamp,
        Vote::DURATION_NORMAL,
        hashes,
    ))
}
