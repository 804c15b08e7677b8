//! Election state machine: one voting round per contested ledger position.
//!
//! An election holds up to `max_blocks` candidate blocks sharing one qualified
//! root and the latest vote from every representative. The tally is derived
//! from those votes using current ledger weights each time it is needed.
//!
//! ```text
//! Ongoing ──quorum──▶ Confirmed
//!    │
//!    └──stop/expire──▶ Stopped
//! ```
//!
//! Both terminal states are final: once reached, `vote` and `publish` no
//! longer change anything. Every terminal transition publishes exactly one
//! [`ElectionEvent`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orv_messages::vote::is_final_timestamp;
use orv_types::{Account, Block, BlockHash, QualifiedRoot};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::config::{share, ElectionConfig};
use crate::online_reps::WeightSnapshot;
use crate::vote_info::{VoteCode, VoteInfo, VoteSource};
use crate::LocalVoteHistory;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElectionState {
    Ongoing,
    /// Reached quorum. Terminal.
    Confirmed,
    /// Stopped without confirming (expired, evicted or shut down). Terminal.
    Stopped,
}

impl ElectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Confirmed => "confirmed",
            Self::Stopped => "stopped",
        }
    }
}

/// Snapshot of an election, published on terminal transitions.
#[derive(Clone, Debug)]
pub struct ElectionStatus {
    pub qualified_root: QualifiedRoot,
    pub winner: Block,
    pub state: ElectionState,
    /// Weight behind the winner at the last tally.
    pub tally: u128,
    /// Final-vote weight behind the winner at the last tally.
    pub final_tally: u128,
    pub block_count: usize,
    pub voter_count: usize,
    /// Wall clock end time, milliseconds since the Unix epoch.
    pub election_end: u64,
    pub election_duration: Duration,
    pub confirmation_request_count: u32,
}

/// Notifications an election emits to its observers.
#[derive(Clone, Debug)]
pub enum ElectionEvent {
    /// A new election was inserted with `winner` as its first candidate.
    Started {
        root: QualifiedRoot,
        winner: BlockHash,
    },
    Confirmed(ElectionStatus),
    Stopped(ElectionStatus),
    /// Quorum was observed for the first time; the local node may now cast
    /// final votes for `winner`.
    QuorumReached {
        root: QualifiedRoot,
        winner: BlockHash,
    },
    /// Another candidate overtook the winner; the ledger should adopt `block`.
    WinnerChanged {
        root: QualifiedRoot,
        previous: BlockHash,
        block: Block,
    },
}

/// Result of offering a block to an election.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// New candidate inserted.
    Added,
    /// New candidate inserted after evicting the given low-weight candidate.
    Replaced(BlockHash),
    /// Already a candidate; its content was refreshed.
    Updated,
    /// Not inserted: terminal election, wrong root, or saturated without
    /// enough weight behind the new block.
    Rejected,
}

/// What an election needs from the outside world for one operation.
pub struct ElectionContext<'a> {
    pub weight: &'a dyn Fn(&Account) -> u128,
    pub weights: WeightSnapshot,
    pub history: &'a LocalVoteHistory,
}

pub struct Election {
    qualified_root: QualifiedRoot,
    config: Arc<ElectionConfig>,
    state: ElectionState,
    winner: Block,
    blocks: HashMap<BlockHash, Block>,
    last_votes: HashMap<Account, VoteInfo>,
    /// Weight per voted hash at the last tally, including hashes that are not
    /// candidates (yet).
    last_tally: HashMap<BlockHash, u128>,
    winner_tally: u128,
    final_weight: u128,
    quorum_reached: bool,
    started: Instant,
    ended: Option<Instant>,
    last_request: Option<Instant>,
    request_count: u32,
    events: UnboundedSender<ElectionEvent>,
}

impl Election {
    pub fn new(
        block: Block,
        config: Arc<ElectionConfig>,
        events: UnboundedSender<ElectionEvent>,
        now: Instant,
    ) -> Self {
        let hash = block.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, block.clone());
        Self {
            qualified_root: block.qualified_root(),
            config,
            state: ElectionState::Ongoing,
            winner: block,
            blocks,
            last_votes: HashMap::new(),
            last_tally: HashMap::new(),
            winner_tally: 0,
            final_weight: 0,
            quorum_reached: false,
            started: now,
            ended: None,
            last_request: None,
            request_count: 0,
            events,
        }
    }

    /// Apply a representative's vote for `hash`.
    ///
    /// Votes must carry a strictly greater timestamp than the one already
    /// recorded for the representative, otherwise they are a [`VoteCode::Replay`].
    /// Live votes arriving within the representative's cooldown are
    /// [`VoteCode::Ignored`] unless they upgrade a non-final vote to final.
    pub fn vote(
        &mut self,
        rep: &Account,
        timestamp: u64,
        hash: BlockHash,
        source: VoteSource,
        ctx: &ElectionContext<'_>,
        now: Instant,
    ) -> VoteCode {
        if self.state != ElectionState::Ongoing {
            return VoteCode::Ignored;
        }
        let weight = (ctx.weight)(rep);
        if weight <= ctx.weights.minimum_principal {
            return VoteCode::Indeterminate;
        }
        if let Some(last) = self.last_votes.get(rep) {
            if timestamp <= last.timestamp {
                return VoteCode::Replay;
            }
            let final_upgrade = is_final_timestamp(timestamp) && !last.is_final();
            if source == VoteSource::Live && !final_upgrade {
                let cooldown = self.config.cooldown(weight, ctx.weights.trended);
                if now.saturating_duration_since(last.time) < cooldown {
                    return VoteCode::Ignored;
                }
            }
        }
        trace!(root = %self.qualified_root, %hash, timestamp, "vote applied");
        self.last_votes.insert(
            *rep,
            VoteInfo {
                time: now,
                timestamp,
                hash,
            },
        );
        self.confirm_if_quorum(ctx, now);
        VoteCode::Vote
    }

    /// Offer a (possibly competing) block to this election.
    pub fn publish(&mut self, block: Block, ctx: &ElectionContext<'_>, now: Instant) -> PublishOutcome {
        if self.state != ElectionState::Ongoing || block.qualified_root() != self.qualified_root {
            return PublishOutcome::Rejected;
        }
        let hash = block.hash();
        if let Some(existing) = self.blocks.get_mut(&hash) {
            *existing = block.clone();
            if self.winner.hash() == hash {
                self.winner = block;
            }
            return PublishOutcome::Updated;
        }
        let mut replaced = None;
        if self.blocks.len() >= self.config.max_blocks {
            match self.replace_by_weight(&hash, ctx) {
                Some(evicted) => replaced = Some(evicted),
                None => return PublishOutcome::Rejected,
            }
        }
        self.blocks.insert(hash, block);
        self.confirm_if_quorum(ctx, now);
        match replaced {
            Some(evicted) => PublishOutcome::Replaced(evicted),
            None => PublishOutcome::Added,
        }
    }

    /// Candidates ordered by tallied weight, heaviest first.
    ///
    /// Ties go to the lower hash, so the ordering depends only on the votes
    /// held and never on the order they arrived in.
    pub fn tally(&mut self, ctx: &ElectionContext<'_>) -> Vec<(u128, BlockHash)> {
        let mut weights: HashMap<BlockHash, u128> = HashMap::new();
        let mut final_weights: HashMap<BlockHash, u128> = HashMap::new();
        for (account, info) in &self.last_votes {
            let weight = (ctx.weight)(account);
            let entry = weights.entry(info.hash).or_default();
            *entry = entry.saturating_add(weight);
            if info.is_final() {
                let entry = final_weights.entry(info.hash).or_default();
                *entry = entry.saturating_add(weight);
            }
        }

        let mut result: Vec<(u128, BlockHash)> = self
            .blocks
            .keys()
            .map(|hash| (weights.get(hash).copied().unwrap_or(0), *hash))
            .collect();
        result.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        self.final_weight = result
            .first()
            .and_then(|(_, hash)| final_weights.get(hash).copied())
            .unwrap_or(0);
        self.last_tally = weights;
        result
    }

    /// Re-tally, switch the winner if another candidate has overtaken it, and
    /// confirm if quorum holds.
    pub fn confirm_if_quorum(&mut self, ctx: &ElectionContext<'_>, now: Instant) {
        if self.state != ElectionState::Ongoing {
            return;
        }
        let tally = self.tally(ctx);
        let Some(&(top_weight, top_hash)) = tally.first() else {
            return;
        };
        let sum = tally.iter().fold(0u128, |acc, (w, _)| acc.saturating_add(*w));
        self.winner_tally = top_weight;

        let previous = self.winner.hash();
        // An unvoted fork never displaces the winner, even with a zero delta.
        if top_weight > 0 && sum >= ctx.weights.delta && top_hash != previous {
            if let Some(block) = self.blocks.get(&top_hash).cloned() {
                debug!(root = %self.qualified_root, from = %previous, to = %top_hash, "election winner changed");
                self.winner = block.clone();
                self.remove_votes(&previous, ctx.history);
                let _ = self.events.send(ElectionEvent::WinnerChanged {
                    root: self.qualified_root,
                    previous,
                    block,
                });
            }
        }

        if self.have_quorum(&tally, sum, &ctx.weights) {
            if !self.quorum_reached {
                self.quorum_reached = true;
                let _ = self.events.send(ElectionEvent::QuorumReached {
                    root: self.qualified_root,
                    winner: self.winner.hash(),
                });
            }
            if !self.config.require_final_quorum || self.final_weight >= ctx.weights.delta {
                self.confirm(now);
            }
        }
    }

    /// Stop an ongoing election without confirming it. Returns `false` if the
    /// election had already reached a terminal state.
    pub fn stop(&mut self, now: Instant) -> bool {
        if self.state != ElectionState::Ongoing {
            return false;
        }
        self.state = ElectionState::Stopped;
        self.ended = Some(now);
        let status = self.status(now);
        debug!(root = %self.qualified_root, blocks = status.block_count, voters = status.voter_count, "election stopped");
        self.release();
        let _ = self.events.send(ElectionEvent::Stopped(status));
        true
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= self.config.timeout()
    }

    /// Whether vote solicitation is due: never requested, or the last request
    /// is older than `interval`.
    pub fn needs_request(&self, now: Instant, interval: Duration) -> bool {
        self.state == ElectionState::Ongoing
            && self
                .last_request
                .map_or(true, |last| now.saturating_duration_since(last) >= interval)
    }

    pub fn mark_requested(&mut self, now: Instant) {
        self.last_request = Some(now);
        self.request_count += 1;
    }

    pub fn status(&self, now: Instant) -> ElectionStatus {
        let end = self.ended.unwrap_or(now);
        ElectionStatus {
            qualified_root: self.qualified_root,
            winner: self.winner.clone(),
            state: self.state,
            tally: self.winner_tally,
            final_tally: self.final_weight,
            block_count: self.blocks.len(),
            voter_count: self.last_votes.len(),
            election_end: orv_utils::milliseconds_since_epoch(),
            election_duration: end.saturating_duration_since(self.started),
            confirmation_request_count: self.request_count,
        }
    }

    pub fn qualified_root(&self) -> &QualifiedRoot {
        &self.qualified_root
    }

    pub fn winner(&self) -> &Block {
        &self.winner
    }

    pub fn state(&self) -> ElectionState {
        self.state
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == ElectionState::Confirmed
    }

    pub fn is_ongoing(&self) -> bool {
        self.state == ElectionState::Ongoing
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn block_hashes(&self) -> impl Iterator<Item = &BlockHash> {
        self.blocks.keys()
    }

    pub fn last_votes(&self) -> &HashMap<Account, VoteInfo> {
        &self.last_votes
    }

    pub fn final_tally(&self) -> u128 {
        self.final_weight
    }

    fn have_quorum(&self, tally: &[(u128, BlockHash)], sum: u128, weights: &WeightSnapshot) -> bool {
        let first = tally.first().map_or(0, |(w, _)| *w);
        let second = tally.get(1).map_or(0, |(w, _)| *w);
        sum >= weights.online_weight_minimum && first > second.saturating_add(weights.delta)
    }

    fn confirm(&mut self, now: Instant) {
        self.state = ElectionState::Confirmed;
        self.ended = Some(now);
        let status = self.status(now);
        debug!(
            root = %self.qualified_root,
            winner = %self.winner.hash(),
            tally = %status.tally,
            voters = status.voter_count,
            duration_ms = status.election_duration.as_millis() as u64,
            "election confirmed"
        );
        self.release();
        let _ = self.events.send(ElectionEvent::Confirmed(status));
    }

    /// Drop candidate bookkeeping once terminal; only the winner is kept.
    fn release(&mut self) {
        let winner = self.winner.hash();
        self.blocks.retain(|hash, _| *hash == winner);
        self.last_tally.clear();
    }

    /// Evict the weakest non-winning candidate to make room for `hash`, if the
    /// weight already voting for `hash` justifies it. Returns the evicted hash.
    fn replace_by_weight(&mut self, hash: &BlockHash, ctx: &ElectionContext<'_>) -> Option<BlockHash> {
        let incoming = self.last_tally.get(hash).copied().unwrap_or(0);
        let required = share(ctx.weights.online, self.config.replace_share_percent.into(), 100);
        if incoming == 0 || incoming < required {
            return None;
        }
        let winner = self.winner.hash();
        let weakest = self
            .blocks
            .keys()
            .filter(|candidate| **candidate != winner)
            .map(|candidate| (self.last_tally.get(candidate).copied().unwrap_or(0), *candidate))
            .min();
        match weakest {
            Some((weight, candidate)) if weight < incoming => {
                self.remove_block(&candidate);
                Some(candidate)
            }
            _ => None,
        }
    }

    fn remove_block(&mut self, hash: &BlockHash) {
        if self.winner.hash() == *hash {
            return;
        }
        if self.blocks.remove(hash).is_some() {
            self.last_votes.retain(|_, info| info.hash != *hash);
        }
    }

    /// Forget the local node's own votes for `hash` so it can vote again for
    /// the new winner.
    fn remove_votes(&mut self, hash: &BlockHash, history: &LocalVoteHistory) {
        let root = self.qualified_root.root;
        for vote in history.votes_for(&root, hash, false) {
            if self
                .last_votes
                .get(&vote.account)
                .is_some_and(|info| info.hash == *hash)
            {
                self.last_votes.remove(&vote.account);
            }
        }
        history.erase(&root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orv_messages::Vote;
    use orv_types::{SendBlock, Signature};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn make_hash(byte: u8) -> BlockHash {
        BlockHash::new([byte; 32])
    }

    fn make_account(seed: u8) -> Account {
        Account::new([seed; 32])
    }

    /// Competing sends on the same previous block, distinguished by balance.
    fn make_send(balance: u128) -> Block {
        Block::Send(SendBlock {
            previous: make_hash(0xAA),
            destination: make_account(0xBB),
            balance,
            signature: Signature::ZERO,
            work: 0,
        })
    }

    struct Fixture {
        weights: HashMap<Account, u128>,
        snapshot: WeightSnapshot,
        history: LocalVoteHistory,
        config: ElectionConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                weights: HashMap::new(),
                snapshot: WeightSnapshot::default(),
                history: LocalVoteHistory::new(64),
                config: ElectionConfig {
                    cooldown_fast_ms: 0,
                    cooldown_medium_ms: 0,
                    cooldown_slow_ms: 0,
                    ..ElectionConfig::default()
                },
            }
        }

        fn rep(mut self, seed: u8, weight: u128) -> Self {
            self.weights.insert(make_account(seed), weight);
            self
        }

        fn election(&self, block: Block) -> (Election, UnboundedReceiver<ElectionEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Election::new(block, Arc::new(self.config.clone()), tx, Instant::now()), rx)
        }

        fn vote(&self, election: &mut Election, rep: u8, timestamp: u64, hash: BlockHash) -> VoteCode {
            self.vote_at(election, rep, timestamp, hash, Instant::now())
        }

        fn vote_at(&self, election: &mut Election, rep: u8, timestamp: u64, hash: BlockHash, now: Instant) -> VoteCode {
            let weights = &self.weights;
            let weight = |a: &Account| weights.get(a).copied().unwrap_or(0);
            let ctx = ElectionContext {
                weight: &weight,
                weights: self.snapshot,
                history: &self.history,
            };
            election.vote(&make_account(rep), timestamp, hash, VoteSource::Live, &ctx, now)
        }

        fn publish(&self, election: &mut Election, block: Block) -> PublishOutcome {
            let weights = &self.weights;
            let weight = |a: &Account| weights.get(a).copied().unwrap_or(0);
            let ctx = ElectionContext {
                weight: &weight,
                weights: self.snapshot,
                history: &self.history,
            };
            election.publish(block, &ctx, Instant::now())
        }
    }

    fn drain(rx: &mut UnboundedReceiver<ElectionEvent>) -> Vec<ElectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn no_quorum_below_online_minimum() {
        let mut f = Fixture::new().rep(1, 60).rep(2, 30);
        f.snapshot.online_weight_minimum = 1_000;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, _rx) = f.election(a.clone());
        assert_eq!(f.publish(&mut election, b.clone()), PublishOutcome::Added);

        assert_eq!(f.vote(&mut election, 1, 1, a.hash()), VoteCode::Vote);
        assert_eq!(f.vote(&mut election, 2, 1, b.hash()), VoteCode::Vote);

        assert_eq!(election.winner().hash(), a.hash());
        assert!(!election.is_confirmed());
        let weights = &f.weights;
        let weight = |acc: &Account| weights.get(acc).copied().unwrap_or(0);
        let ctx = ElectionContext {
            weight: &weight,
            weights: f.snapshot,
            history: &f.history,
        };
        assert_eq!(election.tally(&ctx), vec![(60, a.hash()), (30, b.hash())]);
    }

    #[test]
    fn older_timestamp_is_replay() {
        let mut f = Fixture::new().rep(1, 10);
        f.snapshot.online_weight_minimum = u128::MAX;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, _rx) = f.election(a.clone());
        f.publish(&mut election, b.clone());

        assert_eq!(f.vote(&mut election, 1, 100, a.hash()), VoteCode::Vote);
        assert_eq!(f.vote(&mut election, 1, 50, b.hash()), VoteCode::Replay);
        assert_eq!(f.vote(&mut election, 1, 100, b.hash()), VoteCode::Replay);
        assert_eq!(election.last_votes()[&make_account(1)].hash, a.hash());
    }

    #[test]
    fn cooldown_ignores_fast_revotes_but_not_final_votes() {
        let mut f = Fixture::new().rep(1, 10);
        f.config = ElectionConfig::default();
        f.snapshot.online_weight_minimum = u128::MAX;
        let a = make_send(1);
        let (mut election, _rx) = f.election(a.clone());
        let start = Instant::now();

        assert_eq!(f.vote_at(&mut election, 1, 1, a.hash(), start), VoteCode::Vote);
        assert_eq!(
            f.vote_at(&mut election, 1, 2, a.hash(), start + Duration::from_millis(500)),
            VoteCode::Ignored
        );
        assert_eq!(
            f.vote_at(&mut election, 1, Vote::TIMESTAMP_MAX, a.hash(), start + Duration::from_millis(500)),
            VoteCode::Vote
        );
        assert!(election.last_votes()[&make_account(1)].is_final());
    }

    #[test]
    fn cooldown_elapses() {
        let mut f = Fixture::new().rep(1, 10);
        f.config = ElectionConfig::default();
        f.snapshot.online_weight_minimum = u128::MAX;
        let a = make_send(1);
        let (mut election, _rx) = f.election(a.clone());
        let start = Instant::now();
        f.vote_at(&mut election, 1, 1, a.hash(), start);
        assert_eq!(
            f.vote_at(&mut election, 1, 2, a.hash(), start + Duration::from_secs(15)),
            VoteCode::Vote
        );
    }

    #[test]
    fn quorum_confirms_once_and_freezes() {
        let mut f = Fixture::new().rep(1, 80).rep(2, 10);
        f.snapshot.online_weight_minimum = 50;
        f.snapshot.delta = 60;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, mut rx) = f.election(a.clone());
        f.publish(&mut election, b.clone());

        assert_eq!(f.vote(&mut election, 2, 1, a.hash()), VoteCode::Vote);
        assert!(!election.is_confirmed());
        assert_eq!(f.vote(&mut election, 1, 1, a.hash()), VoteCode::Vote);
        assert!(election.is_confirmed());

        // Terminal: nothing changes the winner any more.
        assert_eq!(f.vote(&mut election, 1, 2, b.hash()), VoteCode::Ignored);
        assert_eq!(f.publish(&mut election, make_send(3)), PublishOutcome::Rejected);
        assert_eq!(election.winner().hash(), a.hash());
        assert!(!election.stop(Instant::now()));

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ElectionEvent::QuorumReached { winner, .. } if winner == a.hash()));
        match &events[1] {
            ElectionEvent::Confirmed(status) => {
                assert_eq!(status.winner, a);
                assert_eq!(status.tally, 90);
                assert_eq!(status.voter_count, 2);
                assert_eq!(status.block_count, 2);
                assert_eq!(status.state, ElectionState::Confirmed);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn lead_must_strictly_exceed_delta() {
        let mut f = Fixture::new().rep(1, 70).rep(2, 10);
        f.snapshot.delta = 60;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, _rx) = f.election(a.clone());
        f.publish(&mut election, b.clone());
        f.vote(&mut election, 2, 1, b.hash());
        f.vote(&mut election, 1, 1, a.hash());
        // 70 - 10 == delta: not enough.
        assert!(!election.is_confirmed());
    }

    #[test]
    fn winner_switches_when_overtaken() {
        let mut f = Fixture::new().rep(1, 10).rep(2, 20);
        f.snapshot.delta = 25;
        f.snapshot.online_weight_minimum = u128::MAX;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, mut rx) = f.election(a.clone());
        f.publish(&mut election, b.clone());

        f.vote(&mut election, 1, 1, a.hash());
        assert_eq!(election.winner().hash(), a.hash());
        f.vote(&mut election, 2, 1, b.hash());
        assert_eq!(election.winner().hash(), b.hash());

        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [ElectionEvent::WinnerChanged { previous, block, .. }] if *previous == a.hash() && *block == b
        ));
    }

    #[test]
    fn tied_challengers_settle_on_the_same_winner_in_any_order() {
        let mut f = Fixture::new().rep(1, 60).rep(2, 60);
        f.snapshot.delta = 53;
        f.snapshot.online_weight_minimum = u128::MAX;
        let (a, b, c) = (make_send(1), make_send(2), make_send(3));
        let lower = b.hash().min(c.hash());

        for order in [[(1, &b), (2, &c)], [(1, &c), (2, &b)]] {
            let (mut election, _rx) = f.election(a.clone());
            f.publish(&mut election, b.clone());
            f.publish(&mut election, c.clone());
            for (rep, block) in order {
                f.vote(&mut election, rep, 1, block.hash());
            }
            assert_eq!(election.winner().hash(), lower);
        }
    }

    #[test]
    fn unvoted_fork_keeps_the_winner_at_zero_delta() {
        let mut f = Fixture::new();
        f.snapshot.online_weight_minimum = u128::MAX;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, mut rx) = f.election(a.clone());
        f.publish(&mut election, b);
        assert_eq!(election.winner().hash(), a.hash());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn no_switch_below_delta() {
        let mut f = Fixture::new().rep(1, 10).rep(2, 20);
        f.snapshot.delta = 100;
        f.snapshot.online_weight_minimum = u128::MAX;
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, _rx) = f.election(a.clone());
        f.publish(&mut election, b.clone());
        f.vote(&mut election, 2, 1, b.hash());
        assert_eq!(election.winner().hash(), a.hash());
    }

    #[test]
    fn winner_switch_drops_local_votes() {
        let mut f = Fixture::new().rep(1, 10).rep(2, 20);
        f.snapshot.online_weight_minimum = u128::MAX;
        let key = orv_crypto::keypair_from_seed(&[9; 32]);
        f.weights.insert(key.account, 5);
        let (a, b) = (make_send(1), make_send(2));
        let (mut election, _rx) = f.election(a.clone());
        f.publish(&mut election, b.clone());

        let local = Arc::new(Vote::new(key.account, &key.private, 1, Vote::DURATION_NORMAL, vec![a.hash()]));
        f.history.add(a.root(), a.hash(), local.clone());
        let weights = &f.weights;
        let weight = |acc: &Account| weights.get(acc).copied().unwrap_or(0);
        let ctx = ElectionContext {
            weight: &weight,
            weights: f.snapshot,
            history: &f.history,
        };
        election.vote(&key.account, 1, a.hash(), VoteSource::Live, &ctx, Instant::now());
        assert!(election.last_votes().contains_key(&key.account));

        election.vote(&make_account(2), 1, b.hash(), VoteSource::Live, &ctx, Instant::now());
        assert_eq!(election.winner().hash(), b.hash());
        assert!(!election.last_votes().contains_key(&key.account));
        assert!(!f.history.exists(&a.root()));
    }

    #[test]
    fn votes_for_unknown_hash_are_recorded_not_tallied() {
        let mut f = Fixture::new().rep(1, 10);
        f.snapshot.online_weight_minimum = u128::MAX;
        let a = make_send(1);
        let (mut election, _rx) = f.election(a.clone());
        assert_eq!(f.vote(&mut election, 1, 1, make_send(7).hash()), VoteCode::Vote);
        assert_eq!(election.last_votes().len(), 1);
        assert_eq!(election.status(Instant::now()).tally, 0);
    }

    #[test]
    fn duplicate_publish_updates_content() {
        let f = Fixture::new();
        let a = make_send(1);
        let (mut election, _rx) = f.election(a.clone());
        assert_eq!(f.publish(&mut election, a.clone()), PublishOutcome::Updated);
    }

    #[test]
    fn publish_rejects_other_root() {
        let f = Fixture::new();
        let (mut election, _rx) = f.election(make_send(1));
        let other = Block::Send(SendBlock {
            previous: make_hash(0x01),
            destination: make_account(0xBB),
            balance: 1,
            signature: Signature::ZERO,
            work: 0,
        });
        assert_eq!(f.publish(&mut election, other), PublishOutcome::Rejected);
    }

    #[test]
    fn saturated_election_requires_weight_to_replace() {
        let mut f = Fixture::new().rep(1, 50);
        f.config.max_blocks = 2;
        f.snapshot.online = 100;
        f.snapshot.online_weight_minimum = u128::MAX;
        f.snapshot.delta = u128::MAX;
        let (a, b, c) = (make_send(1), make_send(2), make_send(3));
        let (mut election, _rx) = f.election(a.clone());
        assert_eq!(f.publish(&mut election, b.clone()), PublishOutcome::Added);

        // No votes behind c yet.
        assert_eq!(f.publish(&mut election, c.clone()), PublishOutcome::Rejected);

        // 50% of online weight votes for c before it is a candidate.
        f.vote(&mut election, 1, 1, c.hash());
        assert_eq!(f.publish(&mut election, c.clone()), PublishOutcome::Replaced(b.hash()));
        assert!(election.contains(&c.hash()));
        assert!(!election.contains(&b.hash()));
        assert!(election.contains(&a.hash()));
    }

    #[test]
    fn stop_publishes_status_once() {
        let f = Fixture::new();
        let (mut election, mut rx) = f.election(make_send(1));
        assert!(election.stop(Instant::now()));
        assert!(!election.stop(Instant::now()));
        assert_eq!(election.state(), ElectionState::Stopped);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ElectionEvent::Stopped(s) if s.state == ElectionState::Stopped));
    }

    #[test]
    fn final_quorum_requirement() {
        let mut f = Fixture::new().rep(1, 100);
        f.config.require_final_quorum = true;
        f.snapshot.delta = 50;
        let a = make_send(1);
        let (mut election, mut rx) = f.election(a.clone());
        f.vote(&mut election, 1, 1, a.hash());
        assert!(!election.is_confirmed());
        f.vote(&mut election, 1, Vote::TIMESTAMP_MAX, a.hash());
        assert!(election.is_confirmed());
        assert_eq!(election.final_tally(), 100);
        // QuorumReached is only published once.
        let quorum_events = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ElectionEvent::QuorumReached { .. }))
            .count();
        assert_eq!(quorum_events, 1);
    }

    #[test]
    fn expiry_and_request_pacing() {
        let f = Fixture::new();
        let (mut election, _rx) = f.election(make_send(1));
        let now = Instant::now();
        let interval = Duration::from_millis(500);
        assert!(election.needs_request(now, interval));
        election.mark_requested(now);
        assert!(!election.needs_request(now, interval));
        assert!(election.needs_request(now + interval, interval));
        assert!(!election.has_expired(now));
        assert!(election.has_expired(now + f.config.timeout()));
    }
}
