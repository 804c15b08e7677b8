//! Message serialization.
//!
//! Messages are bincode-encoded with a hard size limit so that a malicious
//! length prefix cannot make the decoder allocate unbounded memory.

use bincode::Options;

use crate::{Message, MessageError};

/// Maximum encoded message size in bytes.
pub const MAX_MESSAGE_SIZE: u64 = 64 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_MESSAGE_SIZE)
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

pub fn encode_message(message: &Message) -> Result<Vec<u8>, MessageError> {
    options()
        .serialize(message)
        .map_err(|e| MessageError::Malformed(e.to_string()))
}

/// Decode and shape-check a message received from a peer.
pub fn decode_message(bytes: &[u8]) -> Result<Message, MessageError> {
    let message: Message = options()
        .deserialize(bytes)
        .map_err(|e| MessageError::Malformed(e.to_string()))?;
    message.validate_shape()?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfirmReq, Vote};
    use orv_crypto::keypair_from_seed;
    use orv_types::{BlockHash, Root};

    #[test]
    fn confirm_ack_survives_codec() {
        let kp = keypair_from_seed(&[4; 32]);
        let vote = Vote::new(kp.account, &kp.private, 9, 1, vec![BlockHash::new([1; 32])]);
        let bytes = encode_message(&Message::ConfirmAck(vote.clone())).unwrap();
        match decode_message(&bytes).unwrap() {
            Message::ConfirmAck(decoded) => {
                assert_eq!(decoded, vote);
                assert!(decoded.validate());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_message(&[0xFF; 7]).is_err());
    }

    #[test]
    fn empty_vote_rejected_after_decode() {
        let kp = keypair_from_seed(&[4; 32]);
        let mut vote = Vote::new(kp.account, &kp.private, 9, 1, vec![BlockHash::new([1; 32])]);
        vote.hashes.clear();
        let bytes = encode_message(&Message::ConfirmAck(vote)).unwrap();
        assert!(matches!(
            decode_message(&bytes),
            Err(MessageError::InvalidHashCount(0))
        ));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let msg = Message::ConfirmReq(ConfirmReq::single(BlockHash::new([1; 32]), Root::new([2; 32])));
        let mut bytes = encode_message(&msg).unwrap();
        bytes.push(0);
        assert!(decode_message(&bytes).is_err());
    }
}
