//! Vote processor: the untrusted-input boundary for votes.
//!
//! Incoming `(vote, channel)` pairs pass an admission gate that sheds load
//! from low-weight representatives first as the backlog grows. Admitted votes
//! wait in a fair queue keyed by `(tier, channel)`, are signature-checked in
//! bulk outside every election lock, and only then applied to elections.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use orv_crypto::{verify_batch, SignatureCheck};
use orv_messages::{Message, Vote};
use orv_types::{Account, ChannelId};
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, trace};

use crate::config::VoteProcessorConfig;
use crate::fair_queue::{FairQueue, Origin};
use crate::rep_tiers::RepTier;
use crate::vote_info::{VoteCode, VoteSource};
use crate::{ActiveElections, Network, OnlineReps, RepTiers};

/// A vote that made it through verification, with its outcome.
#[derive(Clone, Debug)]
pub struct ProcessedVote {
    pub vote: Arc<Vote>,
    pub channel: ChannelId,
    pub code: VoteCode,
}

/// Whether a vote from a representative in `tier` may join a backlog of
/// `backlog` votes.
pub fn admits(config: &VoteProcessorConfig, backlog: usize, tier: RepTier) -> bool {
    if backlog < config.backlog_all {
        true
    } else if backlog < config.backlog_tier1 {
        tier >= RepTier::Tier1
    } else if backlog < config.backlog_tier2 {
        tier >= RepTier::Tier2
    } else if backlog < config.backlog_tier3 {
        tier >= RepTier::Tier3
    } else {
        false
    }
}

pub struct VoteProcessor {
    config: VoteProcessorConfig,
    active: Arc<ActiveElections>,
    online_reps: Arc<OnlineReps>,
    rep_tiers: Arc<RepTiers>,
    network: Arc<dyn Network>,
    stats: Arc<Stats>,
    queue: Mutex<FairQueue<Arc<Vote>, RepTier>>,
    highest: Mutex<HighestVotes>,
    observers: Mutex<Vec<UnboundedSender<ProcessedVote>>>,
    notify: Notify,
    stopped: AtomicBool,
}

impl VoteProcessor {
    pub fn new(
        config: VoteProcessorConfig,
        active: Arc<ActiveElections>,
        online_reps: Arc<OnlineReps>,
        rep_tiers: Arc<RepTiers>,
        network: Arc<dyn Network>,
        stats: Arc<Stats>,
    ) -> Self {
        let max_pr = config.max_pr_queue;
        let max_non_pr = config.max_non_pr_queue;
        let pr_priority = config.pr_priority.max(1);
        let alive_network = network.clone();
        let queue = FairQueue::new(
            move |origin: &Origin<RepTier>| match origin.source {
                RepTier::None => max_non_pr,
                _ => max_pr,
            },
            move |origin: &Origin<RepTier>| match origin.source {
                RepTier::None => 1,
                RepTier::Tier1 => pr_priority,
                RepTier::Tier2 => pr_priority.saturating_pow(2),
                RepTier::Tier3 => pr_priority.saturating_pow(3),
            },
        )
        .with_alive_query(move |channel| channel.is_loopback() || alive_network.is_alive(channel));

        let highest = HighestVotes::new(config.assist_max_reps);
        Self {
            config,
            active,
            online_reps,
            rep_tiers,
            network,
            stats,
            queue: Mutex::new(queue),
            highest: Mutex::new(highest),
            observers: Mutex::new(Vec::new()),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Offer a vote received on `channel`. Returns `false` if it was shed by
    /// the admission gate or its queue was full.
    pub fn vote(&self, vote: Arc<Vote>, channel: ChannelId) -> bool {
        if self.stopped.load(Ordering::Relaxed) {
            return false;
        }
        let tier = self.rep_tiers.tier(&vote.account);
        let added = {
            let mut queue = self.queue.lock();
            admits(&self.config, queue.len(), tier) && queue.push(vote, Origin::new(tier, channel))
        };
        if added {
            self.stats.inc("vote_processor", "process");
            self.stats.inc("vote_processor_tier", tier.as_str());
            self.notify.notify_one();
        } else {
            self.stats.inc("vote_processor", "overflow");
            self.stats.inc("vote_processor_overflow", tier.as_str());
            trace!(%channel, tier = tier.as_str(), "vote dropped by admission gate");
        }
        added
    }

    /// Receive every vote that passes verification, with its outcome.
    pub fn subscribe(&self) -> UnboundedReceiver<ProcessedVote> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().push(tx);
        rx
    }

    /// Verify and apply one batch. Returns the number of votes taken from the
    /// queue.
    pub fn process_batch(&self) -> usize {
        let batch = self.queue.lock().next_batch(self.config.batch_size.max(1));
        if batch.is_empty() {
            return 0;
        }
        let started = Instant::now();

        let hashes: Vec<_> = batch.iter().map(|(vote, _)| vote.hash()).collect();
        let checks: Vec<SignatureCheck<'_>> = batch
            .iter()
            .zip(&hashes)
            .map(|((vote, _), hash)| SignatureCheck {
                message: hash.as_bytes(),
                signature: &vote.signature,
                account: &vote.account,
            })
            .collect();
        let verified = verify_batch(&checks);

        let now = Instant::now();
        for ((vote, origin), valid) in batch.iter().zip(verified) {
            let channel = origin.channel.unwrap_or(ChannelId::LOOPBACK);
            if valid {
                self.vote_blocking(vote, channel, now);
            } else {
                self.stats.inc("vote", VoteCode::Invalid.as_str());
                debug!(account = %vote.account, %channel, "vote failed signature verification");
            }
        }

        let count = batch.len();
        let elapsed = started.elapsed();
        if count > 50 && elapsed.as_millis() > 100 {
            debug!(count, elapsed_ms = elapsed.as_millis() as u64, "processed vote batch");
        }
        count
    }

    /// Apply a vote whose signature is already known to be good.
    pub fn vote_blocking(&self, vote: &Arc<Vote>, channel: ChannelId, now: Instant) -> VoteCode {
        let results = self.active.vote(vote, VoteSource::Live, now);
        let code = VoteCode::aggregate(results.values());

        if code != VoteCode::Invalid {
            self.online_reps.observe(vote.account, now);
        }
        if !channel.is_loopback() {
            self.assist(vote, channel);
        }
        self.stats.inc("vote", code.as_str());
        trace!(
            account = %vote.account,
            timestamp = vote.timestamp,
            hashes = vote.hashes.len(),
            code = code.as_str(),
            "vote processed"
        );

        let processed = ProcessedVote {
            vote: vote.clone(),
            channel,
            code,
        };
        self.observers
            .lock()
            .retain(|tx| tx.send(processed.clone()).is_ok());
        code
    }

    /// Process until the queue is empty.
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
        self.notify.notify_waiters();
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("vote processor shutting down");
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

    /// Replay our highest known vote from a representative that appears to
    /// have lost track of its own timestamps. Accounts outside every weight
    /// tier are neither tracked nor assisted.
    fn assist(&self, vote: &Arc<Vote>, channel: ChannelId) {
        if vote.is_final() || self.rep_tiers.tier(&vote.account) == RepTier::None {
            return;
        }
        let margin = self.config.assist_sequence_margin;
        let lagging = {
            let mut highest = self.highest.lock();
            match highest.get(&vote.account) {
                Some(max) if max.timestamp > vote.timestamp.saturating_add(margin) => Some(max.clone()),
                Some(max) if max.timestamp >= vote.timestamp => None,
                _ => {
                    highest.insert(vote.clone());
                    None
                }
            }
        };
        if let Some(max) = lagging {
            self.stats.inc("vote_processor", "assist");
            debug!(account = %vote.account, %channel, "replaying highest vote to lagging representative");
            self.network
                .send(channel, Message::ConfirmAck((*max).clone()));
        }
    }

    /// Representatives with a remembered highest vote.
    pub fn assist_len(&self) -> usize {
        self.highest.lock().len()
    }
}

/// Highest non-final vote per representative, bounded. The representative
/// tracked longest is forgotten first.
struct HighestVotes {
    max_size: usize,
    votes: HashMap<Account, Arc<Vote>>,
    order: VecDeque<Account>,
}

impl HighestVotes {
    fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            votes: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, account: &Account) -> Option<&Arc<Vote>> {
        self.votes.get(account)
    }

    fn insert(&mut self, vote: Arc<Vote>) {
        let account = vote.account;
        if self.votes.insert(account, vote).is_some() {
            return;
        }
        self.order.push_back(account);
        while self.votes.len() > self.max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.votes.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.votes.len()
    }
}
