//! Network collaborator: unicast/broadcast and peer discovery.

use orv_messages::Message;
use orv_types::{ChannelId, NodeId};

pub trait Network: Send + Sync {
    fn send(&self, channel: ChannelId, message: Message);

    fn flood(&self, message: Message, channels: &[ChannelId]);

    /// Up to `count` random live peers.
    fn random_set(&self, count: usize) -> Vec<ChannelId>;

    fn find_node_id(&self, node_id: &NodeId) -> Option<ChannelId>;

    fn is_alive(&self, channel: ChannelId) -> bool;
}
