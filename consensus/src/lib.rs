//! Consensus: double-spend resolution via representative voting.
//!
//! Open Representative Voting (ORV):
//! - Each account delegates its weight to a representative.
//! - Representatives vote on conflicting blocks sharing a root.
//! - A block is confirmed once its lead over the runner-up exceeds the
//!   quorum delta of online voting weight.
//!
//! ## Module overview
//!
//! - [`election`]: per-root election state machine (ongoing → confirmed/stopped).
//! - [`active_elections`]: arena of elections keyed by qualified root, plus the vote router.
//! - [`vote_processor`]: admission, bulk signature verification, vote application.
//! - [`vote_generator`]: local vote generation with spacing and final-vote guard.
//! - [`request_aggregator`]: answers peers' confirmation requests.
//! - [`rep_crawler`]: discovers representatives by probing peers.
//! - [`online_reps`]: online and trended weight, quorum delta.
//! - [`rep_tiers`]: periodically recomputed weight tiers for vote admission.
//! - [`fair_queue`]: per-source round-robin admission queue.
//! - [`ledger`], [`network`], [`wallets`]: collaborator traits.

pub mod active_elections;
pub mod config;
pub mod election;
pub mod error;
pub mod fair_queue;
pub mod ledger;
pub mod local_vote_history;
pub mod network;
pub mod online_reps;
pub mod recently_confirmed;
pub mod rep_crawler;
pub mod rep_tiers;
pub mod request_aggregator;
pub mod vote_cache;
pub mod vote_generator;
pub mod vote_info;
pub mod vote_processor;
pub mod vote_spacing;
pub mod wallets;

pub use active_elections::ActiveElections;
pub use config::{
    ConsensusConfig, ElectionConfig, OnlineRepsConfig, RepCrawlerConfig, RequestAggregatorConfig,
    VoteGeneratorConfig, VoteProcessorConfig,
};
pub use election::{
    Election, ElectionContext, ElectionEvent, ElectionState, ElectionStatus, PublishOutcome,
};
pub use error::ConsensusError;
pub use fair_queue::{FairQueue, Origin};
pub use ledger::Ledger;
pub use local_vote_history::LocalVoteHistory;
pub use network::Network;
pub use online_reps::{OnlineReps, WeightSnapshot};
pub use recently_confirmed::RecentlyConfirmed;
pub use rep_crawler::{RepCrawler, Representative};
pub use rep_tiers::{RepTier, RepTiers, TierSnapshot};
pub use request_aggregator::RequestAggregator;
pub use vote_cache::VoteCache;
pub use vote_generator::VoteGenerator;
pub use vote_info::{VoteCode, VoteInfo, VoteSource};
pub use vote_processor::{ProcessedVote, VoteProcessor};
pub use vote_spacing::{Spacing, VoteSpacing};
pub use wallets::Wallets;
