//! Consensus messages exchanged between nodes.

use orv_types::{Block, BlockHash, Root};
use serde::{Deserialize, Serialize};

use crate::{MessageError, Vote, CONFIRM_ACK_HASHES_MAX};

/// Ask peers to vote on a set of `(hash, root)` pairs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmReq {
    pub roots_hashes: Vec<(BlockHash, Root)>,
}

impl ConfirmReq {
    pub fn new(roots_hashes: Vec<(BlockHash, Root)>) -> Self {
        Self { roots_hashes }
    }

    pub fn single(hash: BlockHash, root: Root) -> Self {
        Self::new(vec![(hash, root)])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Flood a block to peers.
    Publish(Block),
    /// Request votes (confirm_req).
    ConfirmReq(ConfirmReq),
    /// A vote, either unsolicited or replying to a confirm_req (confirm_ack).
    ConfirmAck(Vote),
}

/// Discriminant of [`Message`], used for stats and logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Publish,
    ConfirmReq,
    ConfirmAck,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::ConfirmReq => "confirm_req",
            Self::ConfirmAck => "confirm_ack",
        }
    }
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Publish(_) => MessageType::Publish,
            Message::ConfirmReq(_) => MessageType::ConfirmReq,
            Message::ConfirmAck(_) => MessageType::ConfirmAck,
        }
    }

    /// Structural checks a decoded message must pass before it is dispatched.
    pub fn validate_shape(&self) -> Result<(), MessageError> {
        match self {
            Message::Publish(_) => Ok(()),
            Message::ConfirmReq(req) => {
                let n = req.roots_hashes.len();
                if n == 0 || n > CONFIRM_ACK_HASHES_MAX {
                    Err(MessageError::InvalidRootCount(n))
                } else {
                    Ok(())
                }
            }
            Message::ConfirmAck(vote) => {
                let n = vote.hashes.len();
                if n == 0 || n > CONFIRM_ACK_HASHES_MAX {
                    Err(MessageError::InvalidHashCount(n))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_confirm_req_is_rejected() {
        let msg = Message::ConfirmReq(ConfirmReq::new(vec![]));
        assert!(matches!(
            msg.validate_shape(),
            Err(MessageError::InvalidRootCount(0))
        ));
    }

    #[test]
    fn oversized_confirm_req_is_rejected() {
        let pairs = (0..256u32)
            .map(|i| {
                let mut b = [0u8; 32];
                b[..4].copy_from_slice(&i.to_le_bytes());
                (BlockHash::new(b), Root::new(b))
            })
            .collect();
        let msg = Message::ConfirmReq(ConfirmReq::new(pairs));
        assert!(msg.validate_shape().is_err());
        assert_eq!(msg.message_type().as_str(), "confirm_req");
    }
}
