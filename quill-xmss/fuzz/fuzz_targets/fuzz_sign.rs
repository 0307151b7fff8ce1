#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use quill_xmss::{CachePolicy, Params, XmssMt};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

#[derive(Debug, Arbitrary)]
struct SignInput {
    key_seed: [u8; 32],
    messages: Vec<Vec<u8>>,
    skips: Vec<u8>,
    levels: u8,
}

fuzz_target!(|input: SignInput| {
    let policy = CachePolicy::Auto {
        absolute_levels: u32::from(input.levels % 4),
    };
    let mt = XmssMt::new(Params::new(6, 2).with_cache(policy)).unwrap();
    let mut rng = ChaCha20Rng::from_seed(input.key_seed);
    let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();

    let mut last = None;
    for (i, message) in input.messages.iter().take(8).enumerate() {
        // Lose a few reserved indices, as after a crash between persist and sign.
        let skip = input.skips.get(i).copied().unwrap_or(0) % 3;
        for _ in 0..skip {
            if sk.reserve_next_index().is_err() {
                return;
            }
        }
        mt.evict_auth_nodes(&mut sk);

        let Ok(sig) = mt.sign(&mut sk, message) else {
            assert_eq!(sk.remaining(), 0);
            return;
        };
        assert!(mt.verify(&sig, message, &pk));
        if let Some(prev) = last {
            assert!(sig.index > prev, "index did not increase");
        }
        last = Some(sig.index);
    }
});
