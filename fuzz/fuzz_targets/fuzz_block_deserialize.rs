#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Deserializing arbitrary bytes as ledger types must never panic.
    if let Ok(block) = bincode::deserialize::<orv_types::Block>(data) {
        // Hashing and root derivation work on any decoded block.
        let _ = block.hash();
        let _ = block.qualified_root();
    }

    let _ = bincode::deserialize::<orv_types::BlockHash>(data);
    let _ = bincode::deserialize::<orv_types::QualifiedRoot>(data);
    let _ = bincode::deserialize::<orv_types::Signature>(data);
});
