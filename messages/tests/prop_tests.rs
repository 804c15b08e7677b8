use proptest::prelude::*;

use orv_messages::{decode_message, MessageError, Vote, CONFIRM_ACK_HASHES_MAX};

proptest! {
    /// Arbitrary bytes either decode to a vote that re-encodes to the same
    /// bytes, or fail with an error. They never panic.
    #[test]
    fn vote_decoder_is_total(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
        match Vote::from_bytes(&bytes) {
            Ok(vote) => {
                prop_assert!(!vote.hashes.is_empty());
                prop_assert_eq!(vote.to_bytes(), bytes);
            }
            Err(_) => {}
        }
    }

    /// The hash count byte decides the exact length; any other length is
    /// rejected.
    #[test]
    fn wrong_length_is_rejected(
        count in 1usize..=CONFIRM_ACK_HASHES_MAX,
        delta in -31i64..31,
    ) {
        prop_assume!(delta != 0);
        let header = 32 + 64 + 8 + 1 + 1;
        let len = (header + 32 * count) as i64 + delta;
        let mut bytes = vec![0u8; len as usize];
        bytes[32 + 64 + 8 + 1] = count as u8;
        let result = Vote::from_bytes(&bytes);
        prop_assert!(
            matches!(result, Err(MessageError::Truncated { .. }) | Err(MessageError::TrailingBytes(_))),
            "unexpected result {:?}",
            result
        );
    }

    #[test]
    fn message_decoder_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = decode_message(&bytes);
    }
}
