//! Online representative tracking.
//!
//! Quorum is measured against the weight of representatives that are
//! actually voting, not total delegated weight. A representative counts as
//! online for one `weight_interval` after its last live vote. The online
//! weight is sampled once per interval and the median of the retained
//! samples becomes the trended weight, which smooths out short dips.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use orv_types::Account;
use orv_utils::Stats;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::{share, OnlineRepsConfig};
use crate::Ledger;

/// Weight figures an election needs to decide quorum, captured at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeightSnapshot {
    pub online: u128,
    /// Trended weight, floored at `online_weight_minimum`.
    pub trended: u128,
    /// Lead the winner needs over the runner-up.
    pub delta: u128,
    pub online_weight_minimum: u128,
    /// Votes from reps at or below this weight are not applied.
    pub minimum_principal: u128,
}

#[derive(Default)]
struct State {
    reps: HashMap<Account, Instant>,
    online: u128,
    trended: u128,
    samples: VecDeque<u128>,
}

pub struct OnlineReps {
    config: OnlineRepsConfig,
    online_weight_minimum: u128,
    quorum_percent: u8,
    ledger: Arc<dyn Ledger>,
    stats: Arc<Stats>,
    state: Mutex<State>,
}

impl OnlineReps {
    pub fn new(
        config: OnlineRepsConfig,
        online_weight_minimum: u128,
        quorum_percent: u8,
        ledger: Arc<dyn Ledger>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            config,
            online_weight_minimum,
            quorum_percent,
            ledger,
            stats,
            state: Mutex::new(State::default()),
        }
    }

    /// Note a live vote from `rep`. Accounts without weight are ignored.
    pub fn observe(&self, rep: Account, now: Instant) {
        if self.ledger.weight(&rep) == 0 {
            return;
        }
        let mut state = self.state.lock();
        let new_insert = state.reps.insert(rep, now).is_none();
        self.stats.inc(
            "online_reps",
            if new_insert { "rep_new" } else { "rep_update" },
        );
        let trimmed = self.trim_locked(&mut state, now);
        if new_insert || trimmed {
            state.online = self.calculate_online(&state);
        }
    }

    /// Drop representatives not seen within the weight interval.
    pub fn trim(&self, now: Instant) {
        let mut state = self.state.lock();
        if self.trim_locked(&mut state, now) {
            state.online = self.calculate_online(&state);
        }
    }

    /// Record the current online weight as a trend sample.
    pub fn sample(&self) {
        self.stats.inc("online_reps", "sample");
        let mut state = self.state.lock();
        let online = state.online;
        state.samples.push_back(online);
        while state.samples.len() > self.config.trend_samples.max(1) {
            state.samples.pop_front();
        }
        state.trended = median(&state.samples);
        debug!(trended = %state.trended, online = %online, "updated trended weight");
    }

    pub fn online(&self) -> u128 {
        self.state.lock().online
    }

    pub fn trended(&self) -> u128 {
        self.state.lock().trended.max(self.online_weight_minimum)
    }

    pub fn delta(&self) -> u128 {
        let state = self.state.lock();
        self.delta_locked(&state)
    }

    /// Weight below which a representative is not considered principal.
    pub fn minimum_principal_weight(&self) -> u128 {
        self.trended() / 1000
    }

    pub fn snapshot(&self) -> WeightSnapshot {
        let state = self.state.lock();
        let trended = state.trended.max(self.online_weight_minimum);
        WeightSnapshot {
            online: state.online,
            trended,
            delta: self.delta_locked(&state),
            online_weight_minimum: self.online_weight_minimum,
            minimum_principal: trended / 1000,
        }
    }

    /// Representatives currently considered online.
    pub fn list(&self) -> Vec<Account> {
        self.state.lock().reps.keys().copied().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.reps.clear();
        state.online = 0;
    }

    /// Override the online weight, for tests that do not want to drive votes.
    pub fn force_online_weight(&self, weight: u128) {
        self.state.lock().online = weight;
    }

    /// Sample once per weight interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.weight_interval());
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("online reps sampler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.trim(Instant::now());
                    self.sample();
                }
            }
        }
    }

    fn trim_locked(&self, state: &mut State, now: Instant) -> bool {
        let window = self.config.weight_interval();
        let before = state.reps.len();
        state
            .reps
            .retain(|_, seen| now.saturating_duration_since(*seen) < window);
        before != state.reps.len()
    }

    fn calculate_online(&self, state: &State) -> u128 {
        state
            .reps
            .keys()
            .map(|rep| self.ledger.weight(rep))
            .fold(0u128, u128::saturating_add)
    }

    fn delta_locked(&self, state: &State) -> u128 {
        let weight = state
            .online
            .max(state.trended)
            .max(self.online_weight_minimum);
        share(weight, self.quorum_percent.into(), 100)
    }
}

fn median(samples: &VecDeque<u128>) -> u128 {
    if samples.is_empty() {
        return 0;
    }
    let mut items: Vec<u128> = samples.iter().copied().collect();
    let mid = items.len() / 2;
    let (_, median, _) = items.select_nth_unstable(mid);
    *median
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_samples() {
        assert_eq!(median(&VecDeque::new()), 0);
        assert_eq!(median(&VecDeque::from(vec![5, 1, 9])), 5);
        assert_eq!(median(&VecDeque::from(vec![4, 1, 9, 7])), 7);
    }
}
