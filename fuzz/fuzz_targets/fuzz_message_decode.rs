#![no_main]

use libfuzzer_sys::fuzz_target;
use orv_messages::{decode_message, encode_message};

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic. Anything that decodes must
    // re-encode to a message that decodes to the same value.
    let Ok(message) = decode_message(data) else {
        return;
    };
    let _ = message.validate_shape();
    let encoded = encode_message(&message).expect("decoded message re-encodes");
    let again = decode_message(&encoded).expect("re-encoded message decodes");
    assert_eq!(again, message);
});
