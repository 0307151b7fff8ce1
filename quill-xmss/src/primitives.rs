//! Domain-separated hash functions.
//!
//! Every function is `HashEntry(tag, key, material)`: the digest of the tag
//! as an n-byte big-endian integer, then the key, then the material.
//!
//! | Function | Tag | Key | Material |
//! |----------|-----|-----|----------|
//! | F | 0 | n-byte key | n bytes |
//! | H | 1 | n-byte key | 2n bytes |
//! | H_msg | 2 | r ‖ root ‖ toByte(idx, n) | message |
//! | PRF | 3 | n-byte key | 32 bytes |
//! | PRF_keygen | 4 | secret seed | nonce1 ‖ nonce2 ‖ public seed ‖ address |

use crate::address::Address;
use crate::context::Context;
use crate::keys::Nonce;
use crate::params::MAX_N;
use quill_core::{xor_in_place, xor_into};

const TAG_F: u8 = 0;
const TAG_H: u8 = 1;
const TAG_H_MSG: u8 = 2;
const TAG_PRF: u8 = 3;
const TAG_PRF_KEYGEN: u8 = 4;

/// `toByte(x, len)`: big-endian `x` in `out`, zero-padded on the left.
pub fn to_byte(out: &mut [u8], x: u64) {
    out.fill(0);
    let bytes = x.to_be_bytes();
    let take = out.len().min(8);
    let out_len = out.len();
    out[out_len - take..].copy_from_slice(&bytes[8 - take..]);
}

/// Digest `toByte(tag, n) ‖ key ‖ parts...` into `out`.
fn hash_entry(ctx: &Context, out: &mut [u8], tag: u8, key: &[u8], parts: &[&[u8]]) {
    let n = ctx.n();
    let mut prefix = [0u8; MAX_N];
    prefix[n - 1] = tag;

    let mut hasher = ctx.hasher();
    hasher.update(&prefix[..n]);
    hasher.update(key);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize_reset_into(out);
}

/// `F(key, m)`.
pub fn f(ctx: &Context, out: &mut [u8], key: &[u8], m: &[u8]) {
    hash_entry(ctx, out, TAG_F, key, &[m]);
}

/// `H(key, m)` with `m` of 2n bytes.
pub fn h(ctx: &Context, out: &mut [u8], key: &[u8], m: &[u8]) {
    hash_entry(ctx, out, TAG_H, key, &[m]);
}

/// `H_msg(r ‖ root ‖ toByte(idx, n), message)`.
pub fn h_msg(ctx: &Context, out: &mut [u8], r: &[u8], root: &[u8], idx: u64, message: &[u8]) {
    let n = ctx.n();
    let mut idx_bytes = [0u8; MAX_N];
    to_byte(&mut idx_bytes[..n], idx);

    let mut prefix = [0u8; MAX_N];
    prefix[n - 1] = TAG_H_MSG;

    let mut hasher = ctx.hasher();
    hasher.update(&prefix[..n]);
    hasher.update(r);
    hasher.update(root);
    hasher.update(&idx_bytes[..n]);
    hasher.update(message);
    hasher.finalize_reset_into(out);
}

/// `PRF(key, m)`.
pub fn prf(ctx: &Context, out: &mut [u8], key: &[u8], m: &[u8]) {
    hash_entry(ctx, out, TAG_PRF, key, &[m]);
}

/// `PRF(key, toByte(index, 32))`, the per-signature randomizer.
pub fn prf_index(ctx: &Context, out: &mut [u8], key: &[u8], index: u64) {
    let mut material = [0u8; 32];
    to_byte(&mut material, index);
    prf(ctx, out, key, &material);
}

/// `PRF(key, address)`.
pub fn prf_address(ctx: &Context, out: &mut [u8], key: &[u8], adrs: &Address) {
    prf(ctx, out, key, &adrs.to_bytes());
}

/// Secret chain start for a one-time key.
pub fn prf_keygen(
    ctx: &Context,
    out: &mut [u8],
    secret_seed: &[u8],
    nonce: Nonce,
    public_seed: &[u8],
    adrs: &Address,
) {
    hash_entry(
        ctx,
        out,
        TAG_PRF_KEYGEN,
        secret_seed,
        &[
            &nonce.first.to_be_bytes(),
            &nonce.second.to_be_bytes(),
            public_seed,
            &adrs.to_bytes(),
        ],
    );
}

/// Keyed, bitmasked `F` applied in place: `node = F(key, node ⊕ bm)`.
pub fn thash_f(ctx: &Context, node: &mut [u8], public_seed: &[u8], adrs: &Address) {
    let n = ctx.n();
    let mut key = [0u8; MAX_N];
    let mut mask = [0u8; MAX_N];
    prf_address(ctx, &mut key[..n], public_seed, &adrs.with_key_and_mask(0));
    prf_address(ctx, &mut mask[..n], public_seed, &adrs.with_key_and_mask(1));

    xor_in_place(node, &mask[..n]);

    let mut prefix = [0u8; MAX_N];
    prefix[n - 1] = TAG_F;
    let mut hasher = ctx.hasher();
    hasher.update(&prefix[..n]);
    hasher.update(&key[..n]);
    hasher.update(node);
    hasher.finalize_reset_into(node);
}

/// Keyed, bitmasked `H`: `out = H(key, (left ⊕ bm0) ‖ (right ⊕ bm1))`.
pub fn thash_h(
    ctx: &Context,
    out: &mut [u8],
    left: &[u8],
    right: &[u8],
    public_seed: &[u8],
    adrs: &Address,
) {
    let n = ctx.n();
    let mut key = [0u8; MAX_N];
    let mut mask_left = [0u8; MAX_N];
    let mut mask_right = [0u8; MAX_N];
    prf_address(ctx, &mut key[..n], public_seed, &adrs.with_key_and_mask(0));
    prf_address(ctx, &mut mask_left[..n], public_seed, &adrs.with_key_and_mask(1));
    prf_address(ctx, &mut mask_right[..n], public_seed, &adrs.with_key_and_mask(2));

    let mut masked = ctx.scratch();
    masked.resize(2 * n, 0);
    let (lo, hi) = masked.split_at_mut(n);
    xor_into(lo, left, &mask_left[..n]);
    xor_into(hi, right, &mask_right[..n]);

    h(ctx, out, &key[..n], &masked);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashType;
    use crate::params::Params;

    fn context(hash: HashType) -> Context {
        Context::new(Params::new(4, 1).with_hash(hash)).unwrap()
    }

    #[test]
    fn test_to_byte() {
        let mut out = [0xFFu8; 4];
        to_byte(&mut out, 0x0102);
        assert_eq!(out, [0, 0, 1, 2]);

        let mut wide = [0xFFu8; 32];
        to_byte(&mut wide, u64::MAX);
        assert_eq!(&wide[..24], &[0u8; 24]);
        assert_eq!(&wide[24..], &[0xFF; 8]);
    }

    #[test]
    fn test_hash_entry_layout() {
        // F(key, m) is the plain digest of toByte(0, 32) || key || m.
        let ctx = context(HashType::Sha2_256);
        let key = [7u8; 32];
        let m = [9u8; 32];
        let mut out = [0u8; 32];
        f(&ctx, &mut out, &key, &m);

        let mut input = vec![0u8; 32];
        input.extend_from_slice(&key);
        input.extend_from_slice(&m);
        assert_eq!(out, crate::hash::sha256(&input));
    }

    #[test]
    fn test_tags_separate_domains() {
        let ctx = context(HashType::Sha3_256);
        let key = [1u8; 32];
        let m = [2u8; 32];
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        f(&ctx, &mut a, &key, &m);
        prf(&ctx, &mut b, &key, &m);
        assert_ne!(a, b);
    }

    #[test]
    fn test_h_msg_binds_index() {
        let ctx = context(HashType::Shake256);
        let r = [3u8; 32];
        let root = [4u8; 32];
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        h_msg(&ctx, &mut a, &r, &root, 0, b"msg");
        h_msg(&ctx, &mut b, &r, &root, 1, b"msg");
        assert_ne!(a, b);
    }

    #[test]
    fn test_thash_depends_on_address() {
        let ctx = context(HashType::Sha2_256);
        let seed = [5u8; 32];
        let mut a = [6u8; 32];
        let mut b = [6u8; 32];
        thash_f(&ctx, &mut a, &seed, &Address::ots(0, 0, 0));
        thash_f(&ctx, &mut b, &seed, &Address::ots(0, 0, 1));
        assert_ne!(a, b);

        let mut c = [0u8; 32];
        let mut d = [0u8; 32];
        thash_h(&ctx, &mut c, &a, &b, &seed, &Address::hash_tree(0, 0, 0, 0));
        thash_h(&ctx, &mut d, &b, &a, &seed, &Address::hash_tree(0, 0, 0, 0));
        assert_ne!(c, d);
    }

    #[test]
    fn test_wide_digest() {
        let ctx = context(HashType::Sha2_512);
        let seed = [5u8; 64];
        let mut node = [1u8; 64];
        thash_f(&ctx, &mut node, &seed, &Address::ots(0, 0, 0));
        assert_ne!(node, [1u8; 64]);
        assert_eq!(ctx.hasher_pool().idle(), 1);
    }
}
