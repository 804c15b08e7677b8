//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use orv_consensus::ConsensusConfig;
use orv_types::NetworkId;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for an ORV node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). When the file has no
/// `[consensus]` table the consensus timers follow `network`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to participate in.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to keep the Prometheus registry refreshed.
    #[serde(default)]
    pub enable_metrics: bool,

    /// How often metrics are refreshed from the stats table.
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,

    /// Per-channel capacity of the inbound message queue.
    #[serde(default = "default_message_queue_size")]
    pub message_queue_size: usize,

    /// Tasks draining the inbound message queue.
    #[serde(default = "default_message_workers")]
    pub message_workers: usize,

    /// Peers a rebroadcast winner or solicited block is flooded to.
    #[serde(default = "default_flood_fanout")]
    pub flood_fanout: usize,

    /// Principal representatives asked for votes per solicitation round.
    #[serde(default = "default_solicit_reps")]
    pub solicit_reps: usize,

    /// Capacity of the confirmation observer channel.
    #[serde(default = "default_observer_capacity")]
    pub observer_capacity: usize,

    #[serde(default = "default_consensus")]
    pub consensus: ConsensusConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_interval_ms() -> u64 {
    1_000
}

fn default_message_queue_size() -> usize {
    256
}

fn default_message_workers() -> usize {
    2
}

fn default_flood_fanout() -> usize {
    32
}

fn default_solicit_reps() -> usize {
    32
}

fn default_observer_capacity() -> usize {
    1024
}

fn default_consensus() -> ConsensusConfig {
    ConsensusConfig::for_network(default_network())
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Defaults for `network`, with consensus timers to match.
    pub fn for_network(network: NetworkId) -> Self {
        Self {
            network,
            consensus: ConsensusConfig::for_network(network),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let table: toml::Table = s.parse().map_err(|e: toml::de::Error| NodeError::Config(e.to_string()))?;
        let has_consensus = table.contains_key("consensus");
        let mut config: NodeConfig = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| NodeError::Config(e.to_string()))?;
        if !has_consensus {
            config.consensus = ConsensusConfig::for_network(config.network);
        }
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        self.log_format()?;
        if self.message_workers == 0 {
            return Err(NodeError::Config("message_workers must be non-zero".into()));
        }
        if self.message_queue_size == 0 {
            return Err(NodeError::Config("message_queue_size must be non-zero".into()));
        }
        self.consensus.validate()?;
        Ok(())
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn metrics_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.metrics_interval_ms.max(1))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            metrics_interval_ms: default_metrics_interval_ms(),
            message_queue_size: default_message_queue_size(),
            message_workers: default_message_workers(),
            flood_fanout: default_flood_fanout(),
            solicit_reps: default_solicit_reps(),
            observer_capacity: default_observer_capacity(),
            consensus: default_consensus(),
        }
    }
}
