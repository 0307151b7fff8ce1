#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use quill_xmss::{import_private_key, HashType, MultiTreeSignature, PrivateKey, PublicKey};

#[derive(Debug, Arbitrary)]
struct DecodeInput {
    bytes: Vec<u8>,
    tree_height: u8,
    wide: bool,
}

fuzz_target!(|input: DecodeInput| {
    let hash = if input.wide {
        HashType::Sha2_512
    } else {
        HashType::Sha2_256
    };
    let n = hash.output_size();

    // Anything that decodes must encode back to the same bytes.
    if let Ok(sk) = PrivateKey::from_bytes(&input.bytes) {
        let encoded = sk.to_bytes();
        let again = PrivateKey::from_bytes(&encoded).expect("re-decoding an encoded key");
        assert_eq!(again.to_bytes(), encoded);
    }

    if let Ok(pk) = PublicKey::from_bytes(&input.bytes, hash) {
        assert_eq!(pk.to_bytes().len(), 3 * n);
    }

    let tree_height = u32::from(input.tree_height % 21);
    if let Ok(sig) = MultiTreeSignature::from_bytes(&input.bytes, n, tree_height) {
        assert_eq!(sig.to_bytes(), input.bytes);
    }

    if let Ok(text) = core::str::from_utf8(&input.bytes) {
        let _ = import_private_key(text);
    }
});
