//! Representative weight tiers used for vote admission.
//!
//! Tiers are recomputed on a timer from a ledger snapshot and published as an
//! immutable [`TierSnapshot`]; readers clone the `Arc` and never observe a
//! half-built table.

use std::collections::HashSet;
use std::sync::Arc;

use orv_types::Account;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{share, VoteProcessorConfig};
use crate::{Ledger, OnlineReps};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RepTier {
    /// Unknown or below 0.1% of online weight.
    None,
    /// Above 0.1%.
    Tier1,
    /// Above 1%.
    Tier2,
    /// Above 5%.
    Tier3,
}

impl RepTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepTier::None => "none",
            RepTier::Tier1 => "tier_1",
            RepTier::Tier2 => "tier_2",
            RepTier::Tier3 => "tier_3",
        }
    }
}

#[derive(Debug, Default)]
pub struct TierSnapshot {
    tier1: HashSet<Account>,
    tier2: HashSet<Account>,
    tier3: HashSet<Account>,
}

impl TierSnapshot {
    /// Classify `weights` against `total` online weight. Thresholds are in
    /// basis points.
    pub fn compute(weights: &[(Account, u128)], total: u128, bps: [u32; 3]) -> Self {
        let threshold = |b: u32| share(total, b.into(), 10_000);
        let (t1, t2, t3) = (threshold(bps[0]), threshold(bps[1]), threshold(bps[2]));
        let mut snapshot = Self::default();
        for (account, weight) in weights {
            if *weight > t1 {
                snapshot.tier1.insert(*account);
            }
            if *weight > t2 {
                snapshot.tier2.insert(*account);
            }
            if *weight > t3 {
                snapshot.tier3.insert(*account);
            }
        }
        snapshot
    }

    pub fn tier(&self, account: &Account) -> RepTier {
        if self.tier3.contains(account) {
            RepTier::Tier3
        } else if self.tier2.contains(account) {
            RepTier::Tier2
        } else if self.tier1.contains(account) {
            RepTier::Tier1
        } else {
            RepTier::None
        }
    }

    pub fn len(&self) -> usize {
        self.tier1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tier1.is_empty()
    }
}

pub struct RepTiers {
    config: VoteProcessorConfig,
    ledger: Arc<dyn Ledger>,
    online_reps: Arc<OnlineReps>,
    snapshot: RwLock<Arc<TierSnapshot>>,
}

impl RepTiers {
    pub fn new(config: VoteProcessorConfig, ledger: Arc<dyn Ledger>, online_reps: Arc<OnlineReps>) -> Self {
        Self {
            config,
            ledger,
            online_reps,
            snapshot: RwLock::new(Arc::new(TierSnapshot::default())),
        }
    }

    pub fn tier(&self, account: &Account) -> RepTier {
        self.snapshot.read().tier(account)
    }

    pub fn snapshot(&self) -> Arc<TierSnapshot> {
        self.snapshot.read().clone()
    }

    /// Rebuild the tiers from the ledger and swap them in.
    pub fn update(&self) {
        let weights = self.ledger.rep_weights();
        let total = self.online_reps.trended();
        let next = TierSnapshot::compute(
            &weights,
            total,
            [self.config.tier1_bps, self.config.tier2_bps, self.config.tier3_bps],
        );
        debug!(
            tier_1 = next.tier1.len(),
            tier_2 = next.tier2.len(),
            tier_3 = next.tier3.len(),
            "updated representative tiers"
        );
        *self.snapshot.write() = Arc::new(next);
    }

    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.tiers_interval());
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("rep tiers updater shutting down");
                    break;
                }
                _ = interval.tick() => self.update(),
            }
        }
    }
}
