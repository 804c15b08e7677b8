//! Inbound message processor: routes decoded peer messages to the consensus
//! components.
//!
//! Messages are queued per channel in a [`FairQueue`] so one flooding peer
//! cannot starve the others. A small pool of workers drains the queue and
//! hands each message to the component that owns it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use orv_consensus::{
    ActiveElections, FairQueue, Ledger, Network, Origin, PublishOutcome, RequestAggregator,
    VoteProcessor,
};
use orv_messages::Message;
use orv_types::{Block, ChannelId};
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, trace};

/// Messages taken from the queue per batch.
const BATCH_SIZE: usize = 128;

pub struct MessageProcessor {
    active: Arc<ActiveElections>,
    vote_processor: Arc<VoteProcessor>,
    aggregator: Arc<RequestAggregator>,
    ledger: Arc<dyn Ledger>,
    stats: Arc<Stats>,
    queue: Mutex<FairQueue<Message, ()>>,
    notify: Notify,
    stopped: AtomicBool,
}

impl MessageProcessor {
    pub fn new(
        queue_size: usize,
        active: Arc<ActiveElections>,
        vote_processor: Arc<VoteProcessor>,
        aggregator: Arc<RequestAggregator>,
        ledger: Arc<dyn Ledger>,
        network: Arc<dyn Network>,
        stats: Arc<Stats>,
    ) -> Self {
        let queue = FairQueue::new(move |_| queue_size, |_| 1)
            .with_alive_query(move |channel| network.is_alive(channel));
        Self {
            active,
            vote_processor,
            aggregator,
            ledger,
            stats,
            queue: Mutex::new(queue),
            notify: Notify::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Queue `message` received on `channel`. Malformed messages and
    /// messages over the channel's share are dropped and `false` returned.
    pub fn enqueue(&self, message: Message, channel: ChannelId) -> bool {
        if self.stopped.load(Ordering::Relaxed) {
            return false;
        }
        if let Err(e) = message.validate_shape() {
            self.stats.inc("message_queue", "invalid");
            debug!(%channel, error = %e, "malformed message dropped");
            return false;
        }
        let added = self.queue.lock().push(message, Origin::new((), channel));
        if added {
            self.notify.notify_one();
        } else {
            self.stats.inc("message_queue", "overfill");
            trace!(%channel, "message queue full for channel");
        }
        added
    }

    /// Dispatch one batch. Returns how many messages were taken.
    pub fn process_batch(&self, now: Instant) -> usize {
        let batch = self.queue.lock().next_batch(BATCH_SIZE);
        for (message, origin) in &batch {
            let Some(channel) = origin.channel else {
                continue;
            };
            self.dispatch(message.clone(), channel, now);
        }
        batch.len()
    }

    pub fn dispatch(&self, message: Message, channel: ChannelId, now: Instant) {
        self.stats.inc("message", message.message_type().as_str());
        match message {
            Message::Publish(block) => self.publish(block, now),
            Message::ConfirmReq(req) => {
                self.aggregator.request(req.roots_hashes, channel);
            }
            Message::ConfirmAck(vote) => {
                self.vote_processor.vote(Arc::new(vote), channel);
            }
        }
    }

    /// A published block joins the election for its root, or starts one when
    /// none exists. Blocks the ledger already confirmed are ignored, and so are
    /// blocks whose previous block is unknown or whose dependents are not yet
    /// confirmed.
    fn publish(&self, block: Block, now: Instant) {
        let hash = block.hash();
        if self.ledger.block_confirmed(&hash) {
            self.stats.inc("publish", "confirmed");
            return;
        }
        let previous = block.previous();
        let known_previous = previous.is_zero() || self.ledger.block(&previous).is_some();
        if !known_previous || !self.ledger.dependents_confirmed(&block) {
            self.stats.inc("publish", "invalid");
            debug!(%hash, %previous, known_previous, "dropping block that does not extend the ledger");
            return;
        }
        let root = block.qualified_root();
        match self.active.publish(block.clone(), now) {
            PublishOutcome::Rejected if !self.active.active(&root) => {
                if self.active.insert(block, now) {
                    self.stats.inc("publish", "election_started");
                }
            }
            PublishOutcome::Rejected => self.stats.inc("publish", "rejected"),
            _ => self.stats.inc("publish", "candidate"),
        }
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
                    info!("message processor shutting down");
                    self.stop();
                    break;
                }
                _ = self.notify.notified() => {
                    while self.process_batch(Instant::now()) > 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }
        }
    }
}
