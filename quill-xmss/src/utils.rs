//! Digit encoding helpers.

/// Split `x` into `out_len` digits of `lg_w` bits, most significant first.
#[must_use]
pub fn base_w(x: &[u8], lg_w: u32, out_len: usize) -> Vec<u32> {
    let b = lg_w as usize;
    debug_assert!(b > 0 && b <= 8);

    let mut result = Vec::with_capacity(out_len);
    let mask = (1u64 << b) - 1;

    let mut bits: u64 = 0;
    let mut num_bits: usize = 0;
    let mut byte_idx: usize = 0;

    for _ in 0..out_len {
        while num_bits < b && byte_idx < x.len() {
            bits = (bits << 8) | u64::from(x[byte_idx]);
            num_bits += 8;
            byte_idx += 1;
        }

        if num_bits >= b {
            num_bits -= b;
            result.push(((bits >> num_bits) & mask) as u32);
        } else {
            // Input exhausted: pad with zeros.
            result.push(((bits << (b - num_bits)) & mask) as u32);
            num_bits = 0;
        }
    }

    result
}

/// `Σ (w - 1 - digit)` over the message digits.
#[must_use]
pub fn wots_checksum(digits: &[u32], w: u32) -> u32 {
    digits.iter().map(|&d| w - 1 - d).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_w_nibbles() {
        assert_eq!(base_w(&[0x12, 0x34], 4, 4), vec![1, 2, 3, 4]);
        assert_eq!(base_w(&[0xAB], 4, 2), vec![0xA, 0xB]);
    }

    #[test]
    fn test_base_w_crumbs() {
        // 0b11_10_01_00
        assert_eq!(base_w(&[0xE4], 2, 4), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_base_w_bytes() {
        assert_eq!(base_w(&[0xFF, 0x00, 0x7F], 8, 3), vec![255, 0, 127]);
    }

    #[test]
    fn test_base_w_partial() {
        assert_eq!(base_w(&[0x12, 0x34], 4, 2), vec![1, 2]);
    }

    #[test]
    fn test_wots_checksum() {
        assert_eq!(wots_checksum(&[0, 0, 0], 16), 45);
        assert_eq!(wots_checksum(&[15, 15, 15], 16), 0);
        assert_eq!(wots_checksum(&[8, 7], 16), 15);
    }
}
