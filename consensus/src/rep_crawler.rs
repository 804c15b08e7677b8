//! Representative crawler: discovers representatives by probing peers.
//!
//! Process:
//! 1. Periodically send `confirm_req` for a random confirmed block to peers
//! 2. When a vote for that block comes back on the probed channel, learn
//!    which representative answers on that channel
//! 3. Keep the weight-ranked set of reachable representatives used to decide
//!    who gets confirmation requests
//!
//! Probes carry a fixed timeout after which they are forgotten whether or
//! not anyone answered. A representative record is only dropped when its
//! channel dies or its weight falls to zero.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use orv_messages::{ConfirmReq, Message, Vote};
use orv_types::{Account, BlockHash, ChannelId, NodeId, Root};
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::RepCrawlerConfig;
use crate::{Ledger, Network, OnlineReps, RecentlyConfirmed};

/// Attempts at finding a probe block that was not recently confirmed.
const QUERY_TARGET_ATTEMPTS: usize = 4;

/// A representative reachable on a known channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Representative {
    pub account: Account,
    pub weight: u128,
    pub channel: ChannelId,
    pub last_request: Option<Instant>,
    pub last_response: Instant,
}

#[derive(Clone, Copy, Debug)]
struct QueryEntry {
    time: Instant,
    replies: u32,
}

#[derive(Default)]
struct State {
    reps: HashMap<Account, Representative>,
    queries: HashMap<(BlockHash, ChannelId), QueryEntry>,
    responses: VecDeque<(ChannelId, Arc<Vote>)>,
    last_query: Option<Instant>,
}

impl State {
    fn attempts(&self, channel: ChannelId) -> usize {
        self.queries.keys().filter(|(_, c)| *c == channel).count()
    }
}

pub struct RepCrawler {
    config: RepCrawlerConfig,
    ledger: Arc<dyn Ledger>,
    network: Arc<dyn Network>,
    online_reps: Arc<OnlineReps>,
    recently_confirmed: Arc<RecentlyConfirmed>,
    stats: Arc<Stats>,
    state: Mutex<State>,
}

impl RepCrawler {
    pub fn new(
        config: RepCrawlerConfig,
        ledger: Arc<dyn Ledger>,
        network: Arc<dyn Network>,
        online_reps: Arc<OnlineReps>,
        recently_confirmed: Arc<RecentlyConfirmed>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            config,
            ledger,
            network,
            online_reps,
            recently_confirmed,
            stats,
            state: Mutex::new(State::default()),
        }
    }

    /// Attribute a verified vote received on `channel` to an outstanding probe.
    /// Returns `true` if it answered one of our queries.
    pub fn process(&self, vote: Arc<Vote>, channel: ChannelId) -> bool {
        let mut state = self.state.lock();
        let hit = vote
            .hashes
            .iter()
            .find(|hash| state.queries.contains_key(&(**hash, channel)))
            .copied();
        let Some(hash) = hit else {
            return false;
        };
        if state.responses.len() >= self.config.max_responses {
            self.stats.inc("rep_crawler", "response_overflow");
            return false;
        }
        if let Some(query) = state.queries.get_mut(&(hash, channel)) {
            query.replies += 1;
        }
        state.responses.push_back((channel, vote));
        self.stats.inc("rep_crawler", "response");
        debug!(%hash, %channel, "processing rep crawler response");
        true
    }

    /// Turn queued responses into representative records.
    pub fn validate_and_process(&self, now: Instant) {
        let responses = std::mem::take(&mut self.state.lock().responses);
        let minimum = self.online_reps.minimum_principal_weight();

        for (channel, vote) in responses {
            if channel.is_loopback() {
                debug!(account = %vote.account, "ignoring vote from loopback channel");
                continue;
            }
            let weight = self.ledger.weight(&vote.account);
            if weight == 0 || weight < minimum {
                debug!(account = %vote.account, weight = %weight, "ignoring vote from account with too little weight");
                continue;
            }

            let mut state = self.state.lock();
            match state.reps.get_mut(&vote.account) {
                Some(rep) => {
                    rep.last_response = now;
                    rep.weight = weight;
                    if rep.channel != channel {
                        let previous = rep.channel;
                        rep.channel = channel;
                        drop(state);
                        warn!(account = %vote.account, %channel, %previous, "updated representative channel");
                    }
                }
                None => {
                    state.reps.insert(
                        vote.account,
                        Representative {
                            account: vote.account,
                            weight,
                            channel,
                            last_request: None,
                            last_response: now,
                        },
                    );
                    drop(state);
                    self.stats.inc("rep_crawler", "rep_new");
                    info!(account = %vote.account, %channel, "found representative");
                }
            }
        }
    }

    /// Evict representatives with dead channels or no weight, refresh the
    /// weight of the rest, and forget timed out queries.
    pub fn cleanup(&self, now: Instant) {
        let mut state = self.state.lock();

        let network = &self.network;
        let ledger = &self.ledger;
        let stats = &self.stats;
        state.reps.retain(|account, rep| {
            if !network.is_alive(rep.channel) {
                info!(%account, channel = %rep.channel, "evicting representative with dead channel");
                stats.inc("rep_crawler", "channel_dead");
                return false;
            }
            rep.weight = ledger.weight(account);
            if rep.weight == 0 {
                info!(%account, "evicting representative without weight");
                stats.inc("rep_crawler", "weight_zero");
                return false;
            }
            true
        });

        let timeout = self.config.query_timeout();
        state.queries.retain(|(hash, channel), query| {
            if now.saturating_duration_since(query.time) < timeout {
                return true;
            }
            if query.replies == 0 {
                debug!(%hash, %channel, "aborting unresponsive query");
                stats.inc("rep_crawler", "query_timeout");
            } else {
                debug!(%hash, %channel, replies = query.replies, "query completed");
                stats.inc("rep_crawler", "query_completion");
            }
            false
        });
    }

    /// Channels to probe this round.
    pub fn prepare_crawl_targets(&self, sufficient_weight: bool, now: Instant) -> Vec<ChannelId> {
        self.stats.inc(
            "rep_crawler",
            if sufficient_weight { "crawl_normal" } else { "crawl_aggressive" },
        );
        let (count, max_attempts) = if sufficient_weight {
            (self.config.conservative_count, self.config.conservative_max_attempts)
        } else {
            (self.config.aggressive_count, self.config.aggressive_max_attempts)
        };
        let rep_query_interval = self.config.rep_query_interval();

        let mut peers = self.network.random_set(count);
        let state = self.state.lock();
        peers.retain(|channel| {
            let known: Vec<&Representative> = state.reps.values().filter(|r| r.channel == *channel).collect();
            if known.is_empty() {
                state.attempts(*channel) < max_attempts
            } else {
                // Throttle queries to known representatives.
                known.iter().all(|rep| {
                    rep.last_request
                        .map_or(true, |t| now.saturating_duration_since(t) >= rep_query_interval)
                })
            }
        });
        peers
    }

    /// A random confirmed block to probe with, skipping recently confirmed
    /// blocks whose rebroadcast votes would be mistaken for responses.
    pub fn prepare_query_target(&self) -> Option<(BlockHash, Root)> {
        (0..QUERY_TARGET_ATTEMPTS)
            .filter_map(|_| self.ledger.hash_root_random())
            .find(|(hash, _)| !self.recently_confirmed.hash_exists(hash))
    }

    /// Probe `channels` with a confirmation request for one random block.
    pub fn query(&self, channels: &[ChannelId], now: Instant) {
        let Some((hash, root)) = self.prepare_query_target() else {
            debug!("no block to query");
            self.stats.inc("rep_crawler", "query_target_failed");
            return;
        };

        let mut targets = Vec::with_capacity(channels.len());
        {
            let mut state = self.state.lock();
            for channel in channels {
                if self.track_request(&mut state, hash, *channel, now) {
                    targets.push(*channel);
                } else {
                    debug!(%hash, %channel, "ignoring duplicate query");
                    self.stats.inc("rep_crawler", "query_duplicate");
                }
            }
        }
        for channel in targets {
            debug!(%hash, %channel, "sending rep crawler query");
            self.stats.inc("rep_crawler", "query_sent");
            self.network
                .send(channel, Message::ConfirmReq(ConfirmReq::single(hash, root)));
        }
    }

    /// Probe a newly connected channel.
    pub fn query_channel(&self, channel: ChannelId, now: Instant) {
        self.query(&[channel], now);
    }

    /// Probe the peer that announced `node_id` during its handshake. Returns
    /// `false` if no live channel carries that node.
    pub fn query_node_id(&self, node_id: &NodeId, now: Instant) -> bool {
        let Some(channel) = self.network.find_node_id(node_id) else {
            self.stats.inc("rep_crawler", "node_id_unknown");
            return false;
        };
        self.query_channel(channel, now);
        true
    }

    /// Whether `channel` belongs to a principal representative.
    pub fn is_pr(&self, channel: ChannelId) -> bool {
        let minimum = self.online_reps.minimum_principal_weight();
        self.state
            .lock()
            .reps
            .values()
            .any(|rep| rep.channel == channel && rep.weight >= minimum)
    }

    /// Weight of every representative with a live channel.
    pub fn total_weight(&self) -> u128 {
        self.state
            .lock()
            .reps
            .values()
            .filter(|rep| self.network.is_alive(rep.channel))
            .map(|rep| rep.weight)
            .fold(0u128, u128::saturating_add)
    }

    /// Up to `count` representatives with at least `minimum_weight`,
    /// heaviest first.
    pub fn representatives(&self, count: usize, minimum_weight: u128) -> Vec<Representative> {
        let mut reps: Vec<Representative> = self
            .state
            .lock()
            .reps
            .values()
            .filter(|rep| rep.weight >= minimum_weight)
            .cloned()
            .collect();
        reps.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.account.cmp(&b.account)));
        reps.truncate(count);
        reps
    }

    pub fn principal_representatives(&self, count: usize) -> Vec<Representative> {
        self.representatives(count, self.online_reps.minimum_principal_weight())
    }

    pub fn representative_count(&self) -> usize {
        self.state.lock().reps.len()
    }

    pub fn pending_query_count(&self) -> usize {
        self.state.lock().queries.len()
    }

    /// Register a probe without sending anything, for tests.
    pub fn force_query(&self, hash: BlockHash, channel: ChannelId, now: Instant) {
        let mut state = self.state.lock();
        self.track_request(&mut state, hash, channel, now);
    }

    /// Run one crawler iteration.
    pub fn tick(&self, now: Instant) {
        self.stats.inc("rep_crawler", "loop");
        self.validate_and_process(now);
        self.cleanup(now);

        let sufficient = self.sufficient_weight();
        let due = {
            let mut state = self.state.lock();
            let due = state
                .last_query
                .map_or(true, |t| now.saturating_duration_since(t) >= self.query_interval(sufficient));
            if due {
                state.last_query = Some(now);
            }
            due
        };
        if due {
            let targets = self.prepare_crawl_targets(sufficient, now);
            if !targets.is_empty() {
                self.query(&targets, now);
            }
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let interval = self.query_interval(self.sufficient_weight());
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("rep crawler shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => self.tick(Instant::now()),
            }
        }
    }

    /// Whether the reachable representatives cover the minimum online weight.
    fn sufficient_weight(&self) -> bool {
        let minimum = self.online_reps.snapshot().online_weight_minimum;
        let total = self.total_weight();
        total > 0 && total >= minimum
    }

    fn query_interval(&self, sufficient_weight: bool) -> Duration {
        Duration::from_millis(if sufficient_weight {
            self.config.normal_interval_ms
        } else {
            self.config.warmup_interval_ms
        })
    }

    fn track_request(&self, state: &mut State, hash: BlockHash, channel: ChannelId, now: Instant) -> bool {
        if state.queries.contains_key(&(hash, channel)) {
            return false;
        }
        state
            .queries
            .insert((hash, channel), QueryEntry { time: now, replies: 0 });
        // A single host may carry several representatives.
        for rep in state.reps.values_mut().filter(|r| r.channel == channel) {
            rep.last_request = Some(now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    #[test]
    fn attempts_count_queries_per_channel() {
        let mut state = State::default();
        let now = Instant::now();
        for byte in 1..=3 {
            state
                .queries
                .insert((make_hash(byte), ChannelId(7)), QueryEntry { time: now, replies: 0 });
        }
        state
            .queries
            .insert((make_hash(1), ChannelId(8)), QueryEntry { time: now, replies: 0 });
        assert_eq!(state.attempts(ChannelId(7)), 3);
        assert_eq!(state.attempts(ChannelId(8)), 1);
        assert_eq!(state.attempts(ChannelId(9)), 0);
    }
}
