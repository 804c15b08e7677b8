//! Nullable network: record messages without sending them.

use std::collections::{BTreeSet, HashMap};

use orv_consensus::Network;
use orv_messages::Message;
use orv_types::{ChannelId, NodeId};
use parking_lot::Mutex;

/// One recorded outbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub message: Message,
}

#[derive(Default)]
struct State {
    alive: BTreeSet<ChannelId>,
    node_ids: HashMap<NodeId, ChannelId>,
    sent: Vec<SentMessage>,
}

/// A test network that records messages instead of sending them.
///
/// `flood` is recorded as one [`SentMessage`] per target channel.
/// `random_set` returns the lowest-numbered live channels, which keeps tests
/// deterministic.
pub struct NullNetwork {
    state: Mutex<State>,
}

impl NullNetwork {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Create with `count` live channels numbered from 1.
    pub fn with_channels(count: u64) -> Self {
        let network = Self::new();
        for id in 1..=count {
            network.connect(ChannelId(id));
        }
        network
    }

    pub fn connect(&self, channel: ChannelId) {
        self.state.lock().alive.insert(channel);
    }

    pub fn disconnect(&self, channel: ChannelId) {
        self.state.lock().alive.remove(&channel);
    }

    pub fn register_node_id(&self, node_id: NodeId, channel: ChannelId) {
        self.state.lock().node_ids.insert(node_id, channel);
    }

    /// Get all sent messages (for assertions).
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    /// Messages sent to `channel`.
    pub fn sent_to(&self, channel: ChannelId) -> Vec<Message> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|m| m.channel == channel)
            .map(|m| m.message.clone())
            .collect()
    }

    /// Drain the recorded messages.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        std::mem::take(&mut self.state.lock().sent)
    }
}

impl Default for NullNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl Network for NullNetwork {
    fn send(&self, channel: ChannelId, message: Message) {
        self.state.lock().sent.push(SentMessage { channel, message });
    }

    fn flood(&self, message: Message, channels: &[ChannelId]) {
        let mut state = self.state.lock();
        for channel in channels {
            state.sent.push(SentMessage {
                channel: *channel,
                message: message.clone(),
            });
        }
    }

    fn random_set(&self, count: usize) -> Vec<ChannelId> {
        self.state.lock().alive.iter().take(count).copied().collect()
    }

    fn find_node_id(&self, node_id: &NodeId) -> Option<ChannelId> {
        let state = self.state.lock();
        state
            .node_ids
            .get(node_id)
            .copied()
            .filter(|channel| state.alive.contains(channel))
    }

    fn is_alive(&self, channel: ChannelId) -> bool {
        self.state.lock().alive.contains(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orv_messages::ConfirmReq;
    use orv_types::{BlockHash, Root};

    fn request() -> Message {
        Message::ConfirmReq(ConfirmReq::single(BlockHash::new([1; 32]), Root::new([2; 32])))
    }

    #[test]
    fn send_and_flood_are_recorded() {
        let network = NullNetwork::with_channels(3);
        network.send(ChannelId(1), request());
        network.flood(request(), &[ChannelId(2), ChannelId(3)]);
        assert_eq!(network.sent().len(), 3);
        assert_eq!(network.sent_to(ChannelId(3)).len(), 1);
        assert_eq!(network.take_sent().len(), 3);
        assert!(network.sent().is_empty());
    }

    #[test]
    fn random_set_only_returns_live_channels() {
        let network = NullNetwork::with_channels(5);
        network.disconnect(ChannelId(2));
        assert_eq!(
            network.random_set(3),
            vec![ChannelId(1), ChannelId(3), ChannelId(4)]
        );
        assert!(!network.is_alive(ChannelId(2)));
    }

    #[test]
    fn node_id_lookup_requires_live_channel() {
        let network = NullNetwork::with_channels(1);
        let id = NodeId([7; 32]);
        network.register_node_id(id, ChannelId(1));
        assert_eq!(network.find_node_id(&id), Some(ChannelId(1)));
        network.disconnect(ChannelId(1));
        assert_eq!(network.find_node_id(&id), None);
    }
}
