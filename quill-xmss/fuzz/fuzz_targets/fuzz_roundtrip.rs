#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use quill_xmss::{
    export_private_key, import_private_key, CachePolicy, MultiTreeSignature, Params, PrivateKey,
    XmssMt,
};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

#[derive(Debug, Arbitrary)]
struct RoundtripInput {
    key_seed: [u8; 32],
    message: Vec<u8>,
    advance: u8,
}

fuzz_target!(|input: RoundtripInput| {
    let mt = XmssMt::new(Params::new(4, 2).with_cache(CachePolicy::Full)).unwrap();
    let mut rng = ChaCha20Rng::from_seed(input.key_seed);
    let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();

    for _ in 0..input.advance % 8 {
        mt.sign(&mut sk, b"advance").unwrap();
    }

    // Binary round trip
    let mut decoded = PrivateKey::from_bytes(&sk.to_bytes()).unwrap();
    assert_eq!(decoded.public_key(), pk);

    // Text round trip
    let mut imported = import_private_key(&export_private_key(&sk)).unwrap();

    let sig = mt.sign(&mut sk, &input.message).unwrap();
    assert_eq!(mt.sign(&mut decoded, &input.message).unwrap(), sig);
    assert_eq!(mt.sign(&mut imported, &input.message).unwrap(), sig);

    let bytes = sig.to_bytes();
    assert_eq!(bytes.len(), mt.params().signature_bytes(sig.index));
    let parsed = MultiTreeSignature::from_bytes(&bytes, 32, 2).unwrap();
    assert!(mt.verify(&parsed, &input.message, &pk));
});
