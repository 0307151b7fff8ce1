//! WOTS+ (Winternitz One-Time Signature) implementation.
//!
//! Each leaf of a layer tree is a one-time key of `len` hash chains. The
//! chain starts are derived on demand from the secret seed, the leaf's nonce
//! pair and the chain address, so no one-time secret is ever stored.

use crate::address::Address;
use crate::context::Context;
use crate::keys::SeedView;
use crate::parallel::for_each_chunk;
use crate::params::WotsParams;
use crate::primitives::{prf_keygen, thash_f};
use crate::utils::{base_w, wots_checksum};
use subtle::ConstantTimeEq;
use quill_core::{Error, Result};

/// Advance `x` by `steps` chain positions starting at position `start`.
///
/// Returns `None` if the chain would run past position `w - 1`.
pub fn chain(
    ctx: &Context,
    x: &mut [u8],
    start: u32,
    steps: u32,
    public_seed: &[u8],
    adrs: &mut Address,
) -> Option<()> {
    let end = start.checked_add(steps)?;
    if end > ctx.wots().w - 1 {
        return None;
    }
    for j in start..end {
        adrs.set_hash(j);
        thash_f(ctx, x, public_seed, adrs);
    }
    Some(())
}

/// Base-w digits of an n-byte message followed by its checksum digits.
#[must_use]
pub fn message_digits(wots: &WotsParams, message: &[u8]) -> Vec<u32> {
    let mut digits = base_w(message, wots.lg_w, wots.len1);
    let csum = u64::from(wots_checksum(&digits, wots.w)) << wots.checksum_shift();
    let csum_bytes = csum.to_be_bytes();
    digits.extend(base_w(
        &csum_bytes[8 - wots.checksum_bytes()..],
        wots.lg_w,
        wots.len2,
    ));
    digits
}

fn check_seed(seed: &[u8], n: usize, field: &'static str) -> Result<()> {
    if seed.is_empty() {
        return Err(Error::MissingKeyMaterial(field));
    }
    if seed.len() != n {
        return Err(Error::InvalidLength {
            field,
            expected: n,
            actual: seed.len(),
        });
    }
    Ok(())
}

fn check_key_material(ctx: &Context, seeds: &SeedView<'_>) -> Result<()> {
    let n = ctx.n();
    check_seed(seeds.secret_seed, n, "secret seed")?;
    check_seed(seeds.public_seed, n, "public seed")
}

/// Write chain `i` of a one-time key at the position selected by `steps`.
fn chain_from_secret(
    ctx: &Context,
    out: &mut [u8],
    seeds: &SeedView<'_>,
    base: Address,
    leaf: u32,
    i: usize,
    steps: u32,
) -> Result<()> {
    let nonce = seeds.nonces.get(leaf).ok_or(Error::MissingKeyMaterial("leaf nonce"))?;
    let mut adrs = base;
    adrs.set_chain(i as u32);
    prf_keygen(ctx, out, seeds.secret_seed, nonce, seeds.public_seed, &adrs);
    chain(ctx, out, 0, steps, seeds.public_seed, &mut adrs)
        .ok_or(Error::InvalidParameter("chain step out of range"))
}

/// One-time public key (`len` chain ends) of leaf `leaf`.
pub fn public_key(
    ctx: &Context,
    seeds: &SeedView<'_>,
    layer: u32,
    tree: u64,
    leaf: u32,
) -> Result<Vec<u8>> {
    check_key_material(ctx, seeds)?;
    let wots = *ctx.wots();
    let base = Address::ots(layer, tree, leaf);
    let mut pk = vec![0u8; wots.signature_bytes()];
    let failed = parking_lot::Mutex::new(None);

    for_each_chunk(ctx, &mut pk, wots.n, |i, out| {
        if let Err(e) = chain_from_secret(ctx, out, seeds, base, leaf, i, wots.w - 1) {
            *failed.lock() = Some(e);
        }
    });

    match failed.into_inner() {
        Some(e) => Err(e),
        None => Ok(pk),
    }
}

/// Sign an n-byte digest with the one-time key of `leaf`.
pub fn sign(
    ctx: &Context,
    seeds: &SeedView<'_>,
    layer: u32,
    tree: u64,
    leaf: u32,
    message: &[u8],
) -> Result<Vec<u8>> {
    check_key_material(ctx, seeds)?;
    let wots = *ctx.wots();
    if message.len() != wots.n {
        return Err(Error::InvalidLength {
            field: "message digest",
            expected: wots.n,
            actual: message.len(),
        });
    }

    let digits = message_digits(&wots, message);
    let base = Address::ots(layer, tree, leaf);
    let mut sig = vec![0u8; wots.signature_bytes()];
    let failed = parking_lot::Mutex::new(None);

    for_each_chunk(ctx, &mut sig, wots.n, |i, out| {
        if let Err(e) = chain_from_secret(ctx, out, seeds, base, leaf, i, digits[i]) {
            *failed.lock() = Some(e);
        }
    });

    match failed.into_inner() {
        Some(e) => Err(e),
        None => Ok(sig),
    }
}

/// Complete every chain of a signature to recover the one-time public key.
///
/// Returns `None` if the signature or message has the wrong length.
pub fn public_key_from_signature(
    ctx: &Context,
    signature: &[u8],
    message: &[u8],
    public_seed: &[u8],
    layer: u32,
    tree: u64,
    leaf: u32,
) -> Option<Vec<u8>> {
    let wots = *ctx.wots();
    if signature.len() != wots.signature_bytes() || message.len() != wots.n {
        return None;
    }

    let digits = message_digits(&wots, message);
    let base = Address::ots(layer, tree, leaf);
    let mut pk = signature.to_vec();

    for_each_chunk(ctx, &mut pk, wots.n, |i, out| {
        let mut adrs = base;
        adrs.set_chain(i as u32);
        let finished = chain(ctx, out, digits[i], wots.w - 1 - digits[i], public_seed, &mut adrs);
        debug_assert!(finished.is_some());
    });

    Some(pk)
}

/// Check a one-time signature against a known public key in constant time.
pub fn verify(
    ctx: &Context,
    signature: &[u8],
    message: &[u8],
    public_key: &[u8],
    public_seed: &[u8],
    layer: u32,
    tree: u64,
    leaf: u32,
) -> bool {
    match public_key_from_signature(ctx, signature, message, public_seed, layer, tree, leaf) {
        Some(recovered) if recovered.len() == public_key.len() => {
            recovered.ct_eq(public_key).into()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NonceSet;
    use crate::params::{Params, ThreadMode};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    const N: usize = 32;

    struct Fixture {
        public_seed: Vec<u8>,
        secret_seed: Vec<u8>,
        nonces: NonceSet,
    }

    impl Fixture {
        fn new() -> Self {
            let mut rng = ChaCha20Rng::seed_from_u64(42);
            Self {
                public_seed: vec![1u8; N],
                secret_seed: vec![2u8; N],
                nonces: NonceSet::generate(&mut rng, 16, 16),
            }
        }

        fn seeds(&self) -> SeedView<'_> {
            SeedView {
                public_seed: &self.public_seed,
                secret_seed: &self.secret_seed,
                nonces: &self.nonces,
            }
        }
    }

    fn context(w: u32) -> Context {
        Context::new(Params::new(4, 1).with_winternitz(w)).unwrap()
    }

    #[test]
    fn test_chain_composes() {
        let ctx = context(16);
        let seed = [3u8; N];
        let mut adrs = Address::ots(0, 0, 0);

        let mut whole = [9u8; N];
        chain(&ctx, &mut whole, 0, 7, &seed, &mut adrs).unwrap();

        let mut split = [9u8; N];
        chain(&ctx, &mut split, 0, 3, &seed, &mut adrs).unwrap();
        chain(&ctx, &mut split, 3, 4, &seed, &mut adrs).unwrap();
        assert_eq!(whole, split);
    }

    #[test]
    fn test_chain_rejects_overrun() {
        let ctx = context(16);
        let seed = [3u8; N];
        let mut adrs = Address::ots(0, 0, 0);
        let mut x = [0u8; N];
        assert!(chain(&ctx, &mut x, 10, 6, &seed, &mut adrs).is_none());
        assert!(chain(&ctx, &mut x, u32::MAX, 2, &seed, &mut adrs).is_none());
        assert!(chain(&ctx, &mut x, 10, 5, &seed, &mut adrs).is_some());
    }

    #[test]
    fn test_message_digits_checksum() {
        let wots = WotsParams::new(N, 16);
        // All-zero digest: every digit 0, checksum 64 * 15 = 960 = 0x3C0.
        let digits = message_digits(&wots, &[0u8; N]);
        assert_eq!(digits.len(), 67);
        assert!(digits[..64].iter().all(|&d| d == 0));
        assert_eq!(&digits[64..], &[3, 12, 0]);

        // All-ones digest: checksum 0.
        let digits = message_digits(&wots, &[0xFFu8; N]);
        assert_eq!(&digits[64..], &[0, 0, 0]);
    }

    #[test]
    fn test_sign_verify_all_winternitz() {
        let fixture = Fixture::new();
        for w in [4, 16, 256] {
            let ctx = context(w);
            let message = [0x5Au8; N];
            let pk = public_key(&ctx, &fixture.seeds(), 0, 0, 3).unwrap();
            let sig = sign(&ctx, &fixture.seeds(), 0, 0, 3, &message).unwrap();
            assert!(verify(&ctx, &sig, &message, &pk, &fixture.public_seed, 0, 0, 3), "w = {w}");

            let mut other = message;
            other[0] ^= 1;
            assert!(!verify(&ctx, &sig, &other, &pk, &fixture.public_seed, 0, 0, 3));
            assert!(!verify(&ctx, &sig, &message, &pk, &fixture.public_seed, 0, 0, 4));
        }
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let fixture = Fixture::new();
        let ctx = context(16);
        let message = [7u8; N];
        let pk = public_key(&ctx, &fixture.seeds(), 0, 0, 0).unwrap();
        let sig = sign(&ctx, &fixture.seeds(), 0, 0, 0, &message).unwrap();
        assert!(!verify(&ctx, &sig[..sig.len() - 1], &message, &pk, &fixture.public_seed, 0, 0, 0));
        assert!(!verify(&ctx, &sig, &message[..N - 1], &pk, &fixture.public_seed, 0, 0, 0));
    }

    #[test]
    fn test_sign_rejects_bad_key_material() {
        let fixture = Fixture::new();
        let ctx = context(16);
        let message = [7u8; N];

        let mut seeds = fixture.seeds();
        seeds.secret_seed = &[];
        assert_eq!(
            sign(&ctx, &seeds, 0, 0, 0, &message),
            Err(Error::MissingKeyMaterial("secret seed"))
        );

        let short = [0u8; 16];
        let mut seeds = fixture.seeds();
        seeds.public_seed = &short;
        assert!(matches!(
            sign(&ctx, &seeds, 0, 0, 0, &message),
            Err(Error::InvalidLength { field: "public seed", .. })
        ));

        assert!(matches!(
            sign(&ctx, &fixture.seeds(), 0, 0, 0, &message[..8]),
            Err(Error::InvalidLength { .. })
        ));

        // Leaf without a nonce.
        assert_eq!(
            sign(&ctx, &fixture.seeds(), 0, 0, 16, &message),
            Err(Error::MissingKeyMaterial("leaf nonce"))
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let fixture = Fixture::new();
        let single = context(16);
        let full =
            Context::new(Params::new(4, 1).with_threads(ThreadMode::Full)).unwrap();
        let message = [0x33u8; N];

        assert_eq!(
            public_key(&single, &fixture.seeds(), 1, 2, 5).unwrap(),
            public_key(&full, &fixture.seeds(), 1, 2, 5).unwrap()
        );
        assert_eq!(
            sign(&single, &fixture.seeds(), 1, 2, 5, &message).unwrap(),
            sign(&full, &fixture.seeds(), 1, 2, 5, &message).unwrap()
        );
    }
}
