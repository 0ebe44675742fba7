#![no_main]

use cairn_core::{BlockId, Proof};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 32 {
        return;
    }
    let (head, rest) = data.split_at(32);
    let Some(head) = BlockId::from_slice(head) else {
        return;
    };

    // Decoding and verifying untrusted proofs must not panic
    if let Ok(proof) = Proof::from_bytes(rest) {
        let key = proof.key().map(<[u8]>::to_vec).unwrap_or_default();
        let _ = proof.verify(&key, &head);
        let _ = proof.verify_bounded(&key, &head, 4);

        let reencoded = Proof::from_bytes(&proof.to_bytes()).unwrap();
        assert_eq!(reencoded, proof);
    }
});
