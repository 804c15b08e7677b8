//! Network identifier and peer handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which network a node participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Live,
    /// The public test network.
    Test,
    /// Local development network. Timers run much faster.
    Dev,
}

impl NetworkId {
    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Test => "test",
            Self::Dev => "dev",
        }
    }
}

/// Opaque handle to a transport channel owned by the network layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl ChannelId {
    /// The in-process channel used for votes the node generates itself.
    pub const LOOPBACK: Self = Self(0);

    pub fn is_loopback(&self) -> bool {
        *self == Self::LOOPBACK
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_loopback() {
            write!(f, "loopback")
        } else {
            write!(f, "channel#{}", self.0)
        }
    }
}

/// Node identity key announced during the peer handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);
