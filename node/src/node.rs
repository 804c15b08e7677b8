//! The consensus node: wires every consensus component together and owns
//! their background tasks.
//!
//! The node does not own a ledger, transport or key store. It is handed
//! implementations of [`Ledger`], [`Network`] and [`Wallets`] and exposes
//! [`ConsensusNode::receive`] for the transport to feed decoded messages in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orv_consensus::{
    ActiveElections, ElectionEvent, ElectionStatus, Ledger, LocalVoteHistory, Network,
    OnlineReps, RecentlyConfirmed, RepCrawler, RepTiers, RequestAggregator, VoteGenerator,
    VoteProcessor, Wallets,
};
use orv_messages::{decode_message, Message};
use orv_types::{ChannelId, NodeId};
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::confirmation::ConfirmationHandler;
use crate::error::NodeError;
use crate::message_processor::MessageProcessor;
use crate::metrics::{Gauges, NodeMetrics};
use crate::shutdown::ShutdownController;
use crate::solicitor::Solicitor;

/// Timeout for waiting on background tasks during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A running consensus node.
pub struct ConsensusNode {
    pub config: NodeConfig,
    pub stats: Arc<Stats>,
    pub online_reps: Arc<OnlineReps>,
    pub history: Arc<LocalVoteHistory>,
    pub recently_confirmed: Arc<RecentlyConfirmed>,
    /// Elections in progress, keyed by qualified root.
    pub active: Arc<ActiveElections>,
    pub rep_tiers: Arc<RepTiers>,
    pub vote_processor: Arc<VoteProcessor>,
    /// Normal and final vote generators.
    pub generator: Arc<VoteGenerator>,
    pub final_generator: Arc<VoteGenerator>,
    pub aggregator: Arc<RequestAggregator>,
    pub crawler: Arc<RepCrawler>,
    pub messages: Arc<MessageProcessor>,
    pub confirmations: Arc<ConfirmationHandler>,
    pub solicitor: Arc<Solicitor>,
    pub metrics: Arc<NodeMetrics>,
    pub shutdown: Arc<ShutdownController>,

    /// Held until [`start`](Self::start) hands it to the confirmation task.
    events: Mutex<Option<UnboundedReceiver<ElectionEvent>>>,
    /// Handles for spawned background tasks (joined during shutdown).
    task_handles: Vec<JoinHandle<()>>,
}

impl ConsensusNode {
    /// Build every component. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: NodeConfig,
        ledger: Arc<dyn Ledger>,
        network: Arc<dyn Network>,
        wallets: Arc<dyn Wallets>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let consensus = &config.consensus;
        let stats = Arc::new(Stats::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let online_reps = Arc::new(OnlineReps::new(
            consensus.online_reps.clone(),
            consensus.election.online_weight_minimum,
            consensus.election.quorum_percent,
            ledger.clone(),
            stats.clone(),
        ));
        let history = Arc::new(LocalVoteHistory::new(consensus.vote_generator.history_max_size));
        let recently_confirmed = Arc::new(RecentlyConfirmed::new(
            consensus.election.recently_confirmed_size,
        ));
        let active = Arc::new(ActiveElections::new(
            consensus.election.clone(),
            ledger.clone(),
            online_reps.clone(),
            history.clone(),
            recently_confirmed.clone(),
            stats.clone(),
            events_tx,
        ));
        let rep_tiers = Arc::new(RepTiers::new(
            consensus.vote_processor.clone(),
            ledger.clone(),
            online_reps.clone(),
        ));
        let vote_processor = Arc::new(VoteProcessor::new(
            consensus.vote_processor.clone(),
            active.clone(),
            online_reps.clone(),
            rep_tiers.clone(),
            network.clone(),
            stats.clone(),
        ));
        let make_generator = |is_final| {
            Arc::new(VoteGenerator::new(
                consensus.vote_generator.clone(),
                is_final,
                ledger.clone(),
                wallets.clone(),
                network.clone(),
                history.clone(),
                vote_processor.clone(),
                stats.clone(),
            ))
        };
        let generator = make_generator(false);
        let final_generator = make_generator(true);
        let aggregator = Arc::new(RequestAggregator::new(
            consensus.request_aggregator.clone(),
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
            consensus.rep_crawler.clone(),
            ledger.clone(),
            network.clone(),
            online_reps.clone(),
            recently_confirmed.clone(),
            stats.clone(),
        ));
        let messages = Arc::new(MessageProcessor::new(
            config.message_queue_size,
            active.clone(),
            vote_processor.clone(),
            aggregator.clone(),
            ledger.clone(),
            network.clone(),
            stats.clone(),
        ));
        let confirmations = Arc::new(ConfirmationHandler::new(
            ledger,
            network.clone(),
            wallets.clone(),
            generator.clone(),
            final_generator.clone(),
            stats.clone(),
            config.flood_fanout,
            config.observer_capacity,
        ));
        let solicitor = Arc::new(Solicitor::new(
            active.clone(),
            crawler.clone(),
            network,
            generator.clone(),
            wallets,
            stats.clone(),
            consensus.election.request_interval(),
            config.flood_fanout,
            config.solicit_reps,
        ));
        let metrics = Arc::new(NodeMetrics::new()?);

        Ok(Self {
            config,
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
            messages,
            confirmations,
            solicitor,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            events: Mutex::new(Some(events_rx)),
            task_handles: Vec::new(),
        })
    }

    /// Spawn every background loop on the current tokio runtime.
    pub fn start(&mut self) -> Result<(), NodeError> {
        let events = self.events.lock().take().ok_or(NodeError::AlreadyStarted)?;
        info!(network = self.config.network.as_str(), "consensus node starting");

        // Tier and weight tables first, so the first votes are admitted
        // against real numbers.
        self.online_reps.sample();
        self.rep_tiers.update();

        let handles = vec![
            tokio::spawn(self.online_reps.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.rep_tiers.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.vote_processor.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.generator.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.final_generator.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.aggregator.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.crawler.clone().run(self.shutdown.subscribe())),
            tokio::spawn(self.solicitor.clone().run(self.shutdown.subscribe())),
            tokio::spawn(
                self.confirmations
                    .clone()
                    .run(events, self.shutdown.subscribe()),
            ),
        ];
        self.task_handles.extend(handles);

        for _ in 0..self.config.message_workers {
            let handle = tokio::spawn(self.messages.clone().run(self.shutdown.subscribe()));
            self.task_handles.push(handle);
        }

        // ── Crawler feed: every processed vote may answer a probe ────────
        let mut processed = self.vote_processor.subscribe();
        let crawler = self.crawler.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        self.task_handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    vote = processed.recv() => match vote {
                        Some(vote) => {
                            crawler.process(vote.vote, vote.channel);
                        }
                        None => break,
                    },
                }
            }
        }));

        if self.config.enable_metrics {
            let metrics = self.metrics.clone();
            let node = self.gauge_sources();
            let stats = self.stats.clone();
            let mut interval = tokio::time::interval(self.config.metrics_interval());
            let mut shutdown_rx = self.shutdown.subscribe();
            self.task_handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        _ = interval.tick() => metrics.refresh(&stats, node.gauges()),
                    }
                }
            }));
        }

        info!(tasks = self.task_handles.len(), "consensus node started");
        Ok(())
    }

    /// Signal every loop, wait for them to exit and stop all elections.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        info!("consensus node stopping");
        self.shutdown.shutdown();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        let mut timed_out = false;
        for handle in self.task_handles.drain(..) {
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                timed_out = true;
            }
        }
        self.active.clear();

        if timed_out {
            warn!("background tasks did not exit before the shutdown timeout");
            return Err(NodeError::ShutdownTimeout);
        }
        info!("consensus node stopped");
        Ok(())
    }

    /// Start, run until SIGINT or SIGTERM, then stop.
    pub async fn run_until_signal(&mut self) -> Result<(), NodeError> {
        self.start()?;
        self.shutdown.shutdown_on_signal().await;
        self.stop().await
    }

    /// Hand a decoded message from `channel` to the node. Returns `false` if
    /// it was malformed or the channel's queue is full.
    pub fn receive(&self, message: Message, channel: ChannelId) -> bool {
        self.messages.enqueue(message, channel)
    }

    /// Decode a wire message and queue it.
    pub fn receive_bytes(&self, bytes: &[u8], channel: ChannelId) -> Result<bool, NodeError> {
        let message = decode_message(bytes)?;
        Ok(self.receive(message, channel))
    }

    /// A peer finished its handshake: probe it for a representative.
    pub fn channel_connected(&self, channel: ChannelId) {
        self.crawler.query_channel(channel, Instant::now());
    }

    /// Probe a peer by the node id it announced. Returns `false` if the
    /// network has no live channel for it.
    pub fn node_id_connected(&self, node_id: &NodeId) -> bool {
        self.crawler.query_node_id(node_id, Instant::now())
    }

    /// Statuses of confirmed and stopped elections.
    pub fn subscribe_confirmations(&self) -> broadcast::Receiver<ElectionStatus> {
        self.confirmations.subscribe()
    }

    /// Handle every pending election event on the calling thread. Only does
    /// anything before [`start`](Self::start).
    pub fn process_events(&self) -> usize {
        let mut guard = self.events.lock();
        let Some(events) = guard.as_mut() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.confirmations.handle(event);
            handled += 1;
        }
        handled
    }

    /// Current values for the metrics gauges.
    pub fn gauges(&self) -> Gauges {
        self.gauge_sources().gauges()
    }

    fn gauge_sources(&self) -> GaugeSources {
        GaugeSources {
            active: self.active.clone(),
            crawler: self.crawler.clone(),
            vote_processor: self.vote_processor.clone(),
            online_reps: self.online_reps.clone(),
        }
    }
}

/// Components the metrics task reads sizes from.
struct GaugeSources {
    active: Arc<ActiveElections>,
    crawler: Arc<RepCrawler>,
    vote_processor: Arc<VoteProcessor>,
    online_reps: Arc<OnlineReps>,
}

impl GaugeSources {
    fn gauges(&self) -> Gauges {
        Gauges {
            active_elections: self.active.len(),
            representatives: self.crawler.representative_count(),
            vote_backlog: self.vote_processor.len(),
            online_weight: self.online_reps.online(),
            trended_weight: self.online_reps.trended(),
        }
    }
}
