#![no_main]

use libfuzzer_sys::fuzz_target;
use orv_messages::Vote;

fuzz_target!(|data: &[u8]| {
    // The vote wire form is length checked by hand, so truncated counts and
    // trailing bytes are the interesting inputs.
    let Ok(vote) = Vote::from_bytes(data) else {
        return;
    };
    assert_eq!(vote.to_bytes(), data);
    // Signature checks on garbage keys must fail cleanly.
    let _ = vote.validate();
    let _ = vote.is_final();
});
