//! Tunables for every consensus component.
//!
//! Durations are stored as milliseconds so the TOML form stays flat; each
//! section exposes `Duration` accessors. Weights are `u128` and are written to
//! TOML as decimal strings, since TOML integers are limited to 64 bits.

use std::time::Duration;

use orv_types::NetworkId;
use serde::{Deserialize, Serialize};

use crate::ConsensusError;

/// Aggregated configuration of the consensus core.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default)]
    pub election: ElectionConfig,
    #[serde(default)]
    pub vote_processor: VoteProcessorConfig,
    #[serde(default)]
    pub vote_generator: VoteGeneratorConfig,
    #[serde(default)]
    pub rep_crawler: RepCrawlerConfig,
    #[serde(default)]
    pub online_reps: OnlineRepsConfig,
    #[serde(default)]
    pub request_aggregator: RequestAggregatorConfig,
}

impl ConsensusConfig {
    /// Defaults for `network`. The dev network shortens every timer so tests
    /// and local clusters converge quickly.
    pub fn for_network(network: NetworkId) -> Self {
        let mut config = Self::default();
        if network.is_dev() {
            config.election.online_weight_minimum = 0;
            config.election.request_interval_ms = 100;
            config.election.timeout_ms = 60_000;
            config.vote_processor.tiers_interval_ms = 1_000;
            config.vote_generator.spacing_ms = 1_000;
            config.rep_crawler.query_timeout_ms = 1_000;
            config.rep_crawler.rep_query_interval_ms = 500;
            config.rep_crawler.normal_interval_ms = 500;
            config.rep_crawler.warmup_interval_ms = 500;
            config.online_reps.weight_interval_ms = 1_000;
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        if self.election.max_blocks < 2 {
            return Err(ConsensusError::InvalidConfig(
                "election.max_blocks must be at least 2".into(),
            ));
        }
        if self.election.quorum_percent == 0 || self.election.quorum_percent > 100 {
            return Err(ConsensusError::InvalidConfig(
                "election.quorum_percent must be in 1..=100".into(),
            ));
        }
        let vp = &self.vote_processor;
        if !(vp.backlog_all < vp.backlog_tier1
            && vp.backlog_tier1 < vp.backlog_tier2
            && vp.backlog_tier2 < vp.backlog_tier3)
        {
            return Err(ConsensusError::InvalidConfig(
                "vote_processor backlog thresholds must be strictly increasing".into(),
            ));
        }
        if vp.batch_size == 0 || self.request_aggregator.batch_size == 0 {
            return Err(ConsensusError::InvalidConfig("batch sizes must be non-zero".into()));
        }
        if self.vote_generator.threshold == 0
            || self.vote_generator.threshold > orv_messages::CONFIRM_ACK_HASHES_MAX
        {
            return Err(ConsensusError::InvalidConfig(
                "vote_generator.threshold must be in 1..=255".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Candidate blocks held per election before replacement kicks in.
    pub max_blocks: usize,
    /// Share of online weight the winner must lead by.
    pub quorum_percent: u8,
    /// Observed weight required before any election may confirm.
    #[serde(with = "weight_string")]
    pub online_weight_minimum: u128,
    /// Minimum share of online weight a new block needs to displace an
    /// existing candidate in a saturated election.
    pub replace_share_percent: u8,
    pub cooldown_fast_ms: u64,
    pub cooldown_medium_ms: u64,
    pub cooldown_slow_ms: u64,
    /// Reps above this share of trended weight get the fast cooldown.
    pub cooldown_fast_percent: u8,
    /// Reps above this share of trended weight get the medium cooldown.
    pub cooldown_medium_percent: u8,
    /// Elections older than this are stopped.
    pub timeout_ms: u64,
    /// How often an unconfirmed election re-solicits votes.
    pub request_interval_ms: u64,
    pub recently_confirmed_size: usize,
    pub max_elections: usize,
    /// Confirm only once final votes alone exceed the quorum delta.
    pub require_final_quorum: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            max_blocks: 10,
            quorum_percent: 67,
            online_weight_minimum: 60_000_000 * 10u128.pow(30),
            replace_share_percent: 10,
            cooldown_fast_ms: 1_000,
            cooldown_medium_ms: 5_000,
            cooldown_slow_ms: 15_000,
            cooldown_fast_percent: 5,
            cooldown_medium_percent: 1,
            timeout_ms: 300_000,
            request_interval_ms: 500,
            recently_confirmed_size: 65_536,
            max_elections: 5_000,
            require_final_quorum: false,
        }
    }
}

impl ElectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Minimum interval between two live votes from a representative of
    /// `weight`, relative to the trended online weight.
    pub fn cooldown(&self, weight: u128, trended: u128) -> Duration {
        let fast = share(trended, self.cooldown_fast_percent.into(), 100);
        let medium = share(trended, self.cooldown_medium_percent.into(), 100);
        let ms = if weight > fast {
            self.cooldown_fast_ms
        } else if weight > medium {
            self.cooldown_medium_ms
        } else {
            self.cooldown_slow_ms
        };
        Duration::from_millis(ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteProcessorConfig {
    /// Below this backlog every vote is admitted.
    pub backlog_all: usize,
    /// Below this backlog only tier 1 and up are admitted.
    pub backlog_tier1: usize,
    pub backlog_tier2: usize,
    /// At or above this backlog every vote is dropped.
    pub backlog_tier3: usize,
    /// Tier thresholds in basis points of trended online weight.
    pub tier1_bps: u32,
    pub tier2_bps: u32,
    pub tier3_bps: u32,
    /// Per-channel queue capacity for representatives in any tier.
    pub max_pr_queue: usize,
    /// Per-channel queue capacity for accounts without a tier.
    pub max_non_pr_queue: usize,
    /// Base of the per-tier priority (tier n is served `pr_priority^n` times
    /// per round).
    pub pr_priority: usize,
    pub batch_size: usize,
    pub tiers_interval_ms: u64,
    /// Timestamp lag beyond which the cached highest vote is sent back to
    /// the representative.
    pub assist_sequence_margin: u64,
    /// Representatives whose highest vote is remembered for the assist reply.
    pub assist_max_reps: usize,
    pub threads: usize,
}

impl Default for VoteProcessorConfig {
    fn default() -> Self {
        Self {
            backlog_all: 96 * 1024,
            backlog_tier1: 112 * 1024,
            backlog_tier2: 128 * 1024,
            backlog_tier3: 144 * 1024,
            tier1_bps: 10,
            tier2_bps: 100,
            tier3_bps: 500,
            max_pr_queue: 256,
            max_non_pr_queue: 32,
            pr_priority: 3,
            batch_size: 1024,
            tiers_interval_ms: 600_000,
            assist_sequence_margin: 10_000,
            assist_max_reps: 4096,
            threads: 1,
        }
    }
}

impl VoteProcessorConfig {
    pub fn tiers_interval(&self) -> Duration {
        Duration::from_millis(self.tiers_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteGeneratorConfig {
    /// Maximum wait before a partial candidate batch is flushed.
    pub delay_ms: u64,
    /// Once this many candidates are queued, wait one more `delay` for the
    /// batch to fill instead of flushing immediately.
    pub threshold: usize,
    pub max_requests: usize,
    /// Minimum time between votes for different hashes on one root.
    pub spacing_ms: u64,
    pub history_max_size: usize,
}

impl Default for VoteGeneratorConfig {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            threshold: orv_messages::CONFIRM_ACK_HASHES_MAX / 2,
            max_requests: 2048,
            spacing_ms: 15_000,
            history_max_size: 256 * 1024,
        }
    }
}

impl VoteGeneratorConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepCrawlerConfig {
    pub query_timeout_ms: u64,
    pub conservative_count: usize,
    pub aggressive_count: usize,
    pub conservative_max_attempts: usize,
    pub aggressive_max_attempts: usize,
    pub normal_interval_ms: u64,
    /// Tick interval while known weight is below the online minimum.
    pub warmup_interval_ms: u64,
    /// Known representatives are not re-queried more often than this.
    pub rep_query_interval_ms: u64,
    pub max_responses: usize,
}

impl Default for RepCrawlerConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 60_000,
            conservative_count: 10,
            aggressive_count: 40,
            conservative_max_attempts: 4,
            aggressive_max_attempts: 8,
            normal_interval_ms: 7_000,
            warmup_interval_ms: 3_000,
            rep_query_interval_ms: 60_000,
            max_responses: 4096,
        }
    }
}

impl RepCrawlerConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn rep_query_interval(&self) -> Duration {
        Duration::from_millis(self.rep_query_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineRepsConfig {
    /// A representative counts as online for this long after its last vote.
    /// Also the interval between trend samples.
    pub weight_interval_ms: u64,
    /// Number of samples the trended weight is the median of.
    pub trend_samples: usize,
}

impl Default for OnlineRepsConfig {
    fn default() -> Self {
        Self {
            weight_interval_ms: 300_000,
            trend_samples: 4032,
        }
    }
}

impl OnlineRepsConfig {
    pub fn weight_interval(&self) -> Duration {
        Duration::from_millis(self.weight_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestAggregatorConfig {
    /// Per-channel queue capacity.
    pub max_queue: usize,
    pub batch_size: usize,
    pub threads: usize,
}

impl Default for RequestAggregatorConfig {
    fn default() -> Self {
        Self {
            max_queue: 128,
            batch_size: 16,
            threads: 1,
        }
    }
}

mod weight_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// `value * numerator / denominator`, rounded down, without overflowing for
/// weights near `u128::MAX`. Saturates when the result itself does not fit.
pub fn share(value: u128, numerator: u128, denominator: u128) -> u128 {
    if denominator == 0 {
        return 0;
    }
    let whole = (value / denominator).saturating_mul(numerator);
    let rest = (value % denominator).saturating_mul(numerator) / denominator;
    whole.saturating_add(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ConsensusConfig::default().validate().unwrap();
        ConsensusConfig::for_network(NetworkId::Dev).validate().unwrap();
    }

    #[test]
    fn dev_network_shortens_timers() {
        let dev = ConsensusConfig::for_network(NetworkId::Dev);
        let live = ConsensusConfig::for_network(NetworkId::Live);
        assert!(dev.rep_crawler.query_timeout() < live.rep_crawler.query_timeout());
        assert!(dev.vote_generator.spacing() < live.vote_generator.spacing());
        assert_eq!(dev.election.online_weight_minimum, 0);
    }

    #[test]
    fn cooldown_scales_with_weight() {
        let config = ElectionConfig::default();
        let trended = 10_000u128;
        assert_eq!(config.cooldown(600, trended), Duration::from_secs(1));
        assert_eq!(config.cooldown(200, trended), Duration::from_secs(5));
        assert_eq!(config.cooldown(50, trended), Duration::from_secs(15));
    }

    #[test]
    fn unordered_backlog_thresholds_rejected() {
        let mut config = ConsensusConfig::default();
        config.vote_processor.backlog_tier2 = config.vote_processor.backlog_tier1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip_keeps_large_weights() {
        let config = ConsensusConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("online_weight_minimum = \"60000000"));
        let parsed: ConsensusConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: ConsensusConfig = toml::from_str("[election]\nmax_blocks = 4\n").unwrap();
        assert_eq!(parsed.election.max_blocks, 4);
        assert_eq!(parsed.election.quorum_percent, 67);
        assert_eq!(parsed.vote_generator, VoteGeneratorConfig::default());
    }

    #[test]
    fn share_keeps_small_weights() {
        assert_eq!(share(50, 67, 100), 33);
        assert_eq!(share(9_999, 10, 10_000), 9);
        assert_eq!(share(0, 67, 100), 0);
        assert_eq!(share(10, 1, 0), 0);
    }

    #[test]
    fn share_is_exact_for_live_weights() {
        let minimum = 60_000_000 * 10u128.pow(30);
        assert_eq!(share(minimum, 67, 100), 40_200_000 * 10u128.pow(30));
        assert_eq!(share(u128::MAX, 1, 1), u128::MAX);
        assert_eq!(share(u128::MAX, 2, 1), u128::MAX);
    }
}
