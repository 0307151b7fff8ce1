#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use quill_xmss::{Params, XmssMt};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

#[derive(Debug, Arbitrary)]
struct VerifyInput {
    key_seed: [u8; 32],
    message: Vec<u8>,
    corruption_index: usize,
    corruption_value: u8,
}

fuzz_target!(|input: VerifyInput| {
    let mt = XmssMt::new(Params::new(4, 2)).unwrap();
    let mut rng = ChaCha20Rng::from_seed(input.key_seed);
    let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();
    let pk_bytes = pk.to_bytes();

    let sig = mt.sign(&mut sk, &input.message).unwrap().to_bytes();
    assert!(mt.verify_bytes(&sig, &input.message, &pk_bytes).unwrap());

    // Corrupted signature: either a framing error or a rejection
    let mut corrupted = sig.clone();
    let idx = input.corruption_index % corrupted.len();
    corrupted[idx] ^= input.corruption_value | 1; // Ensure at least 1 bit changed
    let accepted = mt
        .verify_bytes(&corrupted, &input.message, &pk_bytes)
        .unwrap_or(false);
    assert!(!accepted, "corrupted signature accepted");

    // Corrupted message
    if !input.message.is_empty() {
        let mut corrupted_msg = input.message.clone();
        let idx = input.corruption_index % corrupted_msg.len();
        corrupted_msg[idx] ^= input.corruption_value | 1;
        assert!(!mt.verify_bytes(&sig, &corrupted_msg, &pk_bytes).unwrap());
    }

    // Arbitrary bytes as a signature never panic
    let _ = mt.verify_bytes(&input.message, &input.message, &pk_bytes);
});
