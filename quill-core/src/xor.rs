//! Bitmask XOR for tweakable hashing.
//!
//! The word-wise path processes eight bytes at a time through safe slice
//! conversions; the tail falls back to the byte-wise loop. Both paths are
//! compared in the tests below.

#[inline(always)]
fn load_word(chunk: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(chunk);
    u64::from_ne_bytes(word)
}

/// XOR `a` and `b` into `out`.
///
/// # Panics
///
/// Panics if the three slices do not have the same length.
#[inline]
pub fn xor_into(out: &mut [u8], a: &[u8], b: &[u8]) {
    assert_eq!(out.len(), a.len(), "xor operands must have equal length");
    assert_eq!(a.len(), b.len(), "xor operands must have equal length");

    let mut out_words = out.chunks_exact_mut(8);
    let mut a_words = a.chunks_exact(8);
    let mut b_words = b.chunks_exact(8);

    for ((o, x), y) in (&mut out_words).zip(&mut a_words).zip(&mut b_words) {
        o.copy_from_slice(&(load_word(x) ^ load_word(y)).to_ne_bytes());
    }

    for ((o, x), y) in out_words
        .into_remainder()
        .iter_mut()
        .zip(a_words.remainder())
        .zip(b_words.remainder())
    {
        *o = x ^ y;
    }
}

/// XOR `mask` into `buf` in place.
///
/// # Panics
///
/// Panics if the slices do not have the same length.
#[inline]
pub fn xor_in_place(buf: &mut [u8], mask: &[u8]) {
    assert_eq!(buf.len(), mask.len(), "xor operands must have equal length");

    let mut buf_words = buf.chunks_exact_mut(8);
    let mut mask_words = mask.chunks_exact(8);

    for (o, m) in (&mut buf_words).zip(&mut mask_words) {
        let word = load_word(o) ^ load_word(m);
        o.copy_from_slice(&word.to_ne_bytes());
    }

    for (o, m) in buf_words
        .into_remainder()
        .iter_mut()
        .zip(mask_words.remainder())
    {
        *o ^= m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_bytewise(a: &[u8], b: &[u8]) -> Vec<u8> {
        a.iter().zip(b).map(|(x, y)| x ^ y).collect()
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn test_xor_into_matches_bytewise_all_lengths() {
        for len in 0..=130 {
            let a = pattern(len, 7);
            let b = pattern(len, 201);
            let mut out = vec![0u8; len];
            xor_into(&mut out, &a, &b);
            assert_eq!(out, xor_bytewise(&a, &b), "length {len}");
        }
    }

    #[test]
    fn test_xor_unaligned_offsets() {
        let a = pattern(96, 3);
        let b = pattern(96, 99);
        for offset in 0..8 {
            let len = 64;
            let mut out = vec![0u8; len];
            xor_into(&mut out, &a[offset..offset + len], &b[offset..offset + len]);
            assert_eq!(
                out,
                xor_bytewise(&a[offset..offset + len], &b[offset..offset + len])
            );
        }
    }

    #[test]
    fn test_xor_in_place_matches_bytewise() {
        for len in [0usize, 1, 7, 8, 9, 31, 32, 33, 64] {
            let mut buf = pattern(len, 11);
            let mask = pattern(len, 250);
            let expected = xor_bytewise(&buf, &mask);
            xor_in_place(&mut buf, &mask);
            assert_eq!(buf, expected);
        }
    }

    #[test]
    fn test_xor_self_inverse() {
        let mut buf = pattern(32, 1);
        let original = buf.clone();
        let mask = pattern(32, 77);
        xor_in_place(&mut buf, &mask);
        xor_in_place(&mut buf, &mask);
        assert_eq!(buf, original);
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn test_xor_length_mismatch_panics() {
        let mut out = [0u8; 4];
        xor_into(&mut out, &[0u8; 4], &[0u8; 3]);
    }
}
