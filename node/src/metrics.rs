//! Prometheus metrics for the ORV node.
//!
//! Consensus components only bump counters in the shared [`Stats`] table.
//! [`NodeMetrics::refresh`] copies them into a dedicated [`Registry`] on a
//! timer, so the hot paths never touch prometheus.

use prometheus::{
    register_gauge_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Gauge, IntCounter,
    IntCounterVec, IntGauge, Opts, Registry,
};

use orv_consensus::VoteCode;
use orv_utils::Stats;

use crate::NodeError;

const VOTE_CODES: [VoteCode; 5] = [
    VoteCode::Invalid,
    VoteCode::Replay,
    VoteCode::Vote,
    VoteCode::Indeterminate,
    VoteCode::Ignored,
];

/// Point-in-time sizes that are not counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gauges {
    pub active_elections: usize,
    pub representatives: usize,
    pub vote_backlog: usize,
    pub online_weight: u128,
    pub trended_weight: u128,
}

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Processed votes by outcome.
    pub votes: IntCounterVec,
    pub votes_overflow: IntCounter,
    pub elections_confirmed: IntCounter,
    pub elections_stopped: IntCounter,
    pub votes_generated: IntCounter,
    pub crawler_queries: IntCounter,
    pub messages_dropped: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub active_elections: IntGauge,
    pub representatives: IntGauge,
    pub vote_backlog: IntGauge,
    /// Weights are u128 raw units, exported as floats.
    pub online_weight: Gauge,
    pub trended_weight: Gauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, NodeError> {
        let registry = Registry::new();

        let votes = register_int_counter_vec_with_registry!(
            Opts::new("orv_votes_total", "Processed votes by outcome"),
            &["code"],
            registry
        )?;
        let votes_overflow = register_int_counter_with_registry!(
            Opts::new("orv_votes_overflow_total", "Votes shed by the admission gate"),
            registry
        )?;
        let elections_confirmed = register_int_counter_with_registry!(
            Opts::new("orv_elections_confirmed_total", "Elections that reached quorum"),
            registry
        )?;
        let elections_stopped = register_int_counter_with_registry!(
            Opts::new(
                "orv_elections_stopped_total",
                "Elections stopped without confirming"
            ),
            registry
        )?;
        let votes_generated = register_int_counter_with_registry!(
            Opts::new("orv_votes_generated_total", "Locally generated vote broadcasts"),
            registry
        )?;
        let crawler_queries = register_int_counter_with_registry!(
            Opts::new("orv_crawler_queries_total", "Representative crawler probes sent"),
            registry
        )?;
        let messages_dropped = register_int_counter_with_registry!(
            Opts::new("orv_messages_dropped_total", "Inbound messages dropped"),
            registry
        )?;

        let active_elections = register_int_gauge_with_registry!(
            Opts::new("orv_active_elections", "Current number of active elections"),
            registry
        )?;
        let representatives = register_int_gauge_with_registry!(
            Opts::new("orv_representatives", "Representatives known to the crawler"),
            registry
        )?;
        let vote_backlog = register_int_gauge_with_registry!(
            Opts::new("orv_vote_backlog", "Votes waiting for verification"),
            registry
        )?;
        let online_weight = register_gauge_with_registry!(
            Opts::new("orv_online_weight", "Weight of recently voting representatives"),
            registry
        )?;
        let trended_weight = register_gauge_with_registry!(
            Opts::new("orv_trended_weight", "Median of sampled online weight"),
            registry
        )?;

        Ok(Self {
            registry,
            votes,
            votes_overflow,
            elections_confirmed,
            elections_stopped,
            votes_generated,
            crawler_queries,
            messages_dropped,
            active_elections,
            representatives,
            vote_backlog,
            online_weight,
            trended_weight,
        })
    }

    /// Bring every metric up to date with `stats` and `gauges`.
    pub fn refresh(&self, stats: &Stats, gauges: Gauges) {
        for code in VOTE_CODES {
            let counter = self.votes.with_label_values(&[code.as_str()]);
            advance(&counter, stats.count("vote", code.as_str()));
        }
        advance(&self.votes_overflow, stats.count("vote_processor", "overflow"));
        advance(&self.elections_confirmed, stats.count("active", "confirmed"));
        advance(&self.elections_stopped, stats.count("active", "stopped"));
        advance(
            &self.votes_generated,
            stats.count("vote_generator", "generator_broadcasts"),
        );
        advance(&self.crawler_queries, stats.count("rep_crawler", "query_sent"));
        advance(&self.messages_dropped, stats.count("message_queue", "overfill"));

        self.active_elections.set(gauges.active_elections as i64);
        self.representatives.set(gauges.representatives as i64);
        self.vote_backlog.set(gauges.vote_backlog as i64);
        self.online_weight.set(gauges.online_weight as f64);
        self.trended_weight.set(gauges.trended_weight as f64);
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, NodeError> {
        use prometheus::Encoder;
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| NodeError::Config(e.to_string()))
    }
}

/// Counters only move forward, so add the difference to the stats value.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}
