//! Engine parameters.
//!
//! Unlike fixed parameter sets, a stateful key fixes its geometry at key
//! generation time, so parameters are runtime values validated once when an
//! engine is constructed.

use crate::hash::HashType;
use quill_core::{Error, Result};

/// Maximum digest size across supported hashes.
pub const MAX_N: usize = 64;

/// Maximum total tree height.
pub const MAX_HEIGHT: u32 = 60;

/// Maximum number of layers.
pub const MAX_LAYERS: u32 = 12;

/// Maximum height of a single layer tree.
pub const MAX_TREE_HEIGHT: u32 = 20;

/// Node caching policy applied when tree nodes are computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CachePolicy {
    /// Keep reachable nodes in the `absolute_levels` levels nearest the root,
    /// plus the next authentication path.
    ///
    /// Absolute levels count down from the root, not up from the leaves. A
    /// node near the root costs a whole subtree to recompute and there are
    /// few of them; low levels are cheap to rebuild and the next-path nodes
    /// already cover the ones signing needs.
    Auto {
        /// Number of levels below the root kept unconditionally (at most 20).
        absolute_levels: u32,
    },
    /// Keep every node still reachable by a future authentication path.
    Full,
    /// Keep nothing.
    Disabled,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::Auto { absolute_levels: 4 }
    }
}

/// Worker fan-out used for key generation and subtree hashing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ThreadMode {
    /// Run on the calling thread.
    #[default]
    Single,
    /// A quarter of the available cores.
    Quarter,
    /// Half of the available cores.
    Half,
    /// Three quarters of the available cores.
    ThreeQuarters,
    /// Every available core.
    Full,
}

impl ThreadMode {
    /// Number of worker threads for a machine with `cores` logical cores.
    #[must_use]
    pub fn worker_count(self, cores: usize) -> usize {
        let workers = match self {
            ThreadMode::Single => return 1,
            ThreadMode::Quarter => cores / 4,
            ThreadMode::Half => cores / 2,
            ThreadMode::ThreeQuarters => cores * 3 / 4,
            ThreadMode::Full => cores,
        };
        workers.max(1)
    }
}

/// Derived WOTS+ lengths for a digest size and Winternitz parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WotsParams {
    /// Digest size in bytes.
    pub n: usize,
    /// Winternitz parameter.
    pub w: u32,
    /// log2(w).
    pub lg_w: u32,
    /// Message digits.
    pub len1: usize,
    /// Checksum digits.
    pub len2: usize,
    /// Total chains.
    pub len: usize,
}

impl WotsParams {
    /// Derive lengths for digest size `n` and Winternitz parameter `w`.
    ///
    /// `w` must be a power of two.
    #[must_use]
    pub fn new(n: usize, w: u32) -> Self {
        let lg_w = w.trailing_zeros();
        let len1 = (8 * n).div_ceil(lg_w as usize);
        let max_checksum = (len1 as u32) * (w - 1);
        let floor_log2 = 31 - max_checksum.leading_zeros();
        let len2 = (floor_log2 / lg_w) as usize + 1;
        Self {
            n,
            w,
            lg_w,
            len1,
            len2,
            len: len1 + len2,
        }
    }

    /// One-time signature size in bytes.
    #[must_use]
    pub const fn signature_bytes(&self) -> usize {
        self.len * self.n
    }

    /// Left shift applied to the checksum before encoding.
    #[must_use]
    pub const fn checksum_shift(&self) -> u32 {
        (8 - (self.len2 as u32 * self.lg_w) % 8) % 8
    }

    /// Bytes holding the shifted checksum.
    #[must_use]
    pub const fn checksum_bytes(&self) -> usize {
        (self.len2 * self.lg_w as usize).div_ceil(8)
    }
}

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "kebab-case"))]
pub struct Params {
    /// Primary digest.
    pub hash: HashType,
    /// Optional secondary digest with its own root.
    pub backup_hash: Option<HashType>,
    /// Total height `h`.
    pub height: u32,
    /// Number of layers `d`.
    pub layers: u32,
    /// Winternitz parameter `w`.
    pub winternitz: u32,
    /// Nonces are drawn from `[0, 2^nonce_exponent)`.
    pub nonce_exponent: u32,
    /// Node caching policy.
    pub cache: CachePolicy,
    /// Worker fan-out.
    pub threads: ThreadMode,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            hash: HashType::Sha2_256,
            backup_hash: None,
            height: 10,
            layers: 1,
            winternitz: 16,
            nonce_exponent: 16,
            cache: CachePolicy::default(),
            threads: ThreadMode::Single,
        }
    }
}

impl Params {
    /// Defaults with the given geometry.
    #[must_use]
    pub fn new(height: u32, layers: u32) -> Self {
        Self {
            height,
            layers,
            ..Self::default()
        }
    }

    /// Set the primary digest.
    #[must_use]
    pub fn with_hash(mut self, hash: HashType) -> Self {
        self.hash = hash;
        self
    }

    /// Set the backup digest.
    #[must_use]
    pub fn with_backup_hash(mut self, backup: Option<HashType>) -> Self {
        self.backup_hash = backup;
        self
    }

    /// Set the Winternitz parameter.
    #[must_use]
    pub fn with_winternitz(mut self, w: u32) -> Self {
        self.winternitz = w;
        self
    }

    /// Set the nonce exponent.
    #[must_use]
    pub fn with_nonce_exponent(mut self, exponent: u32) -> Self {
        self.nonce_exponent = exponent;
        self
    }

    /// Set the cache policy.
    #[must_use]
    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    /// Set the thread mode.
    #[must_use]
    pub fn with_threads(mut self, threads: ThreadMode) -> Self {
        self.threads = threads;
        self
    }

    /// Check every constraint.
    pub fn validate(&self) -> Result<()> {
        if !(2..=MAX_HEIGHT).contains(&self.height) {
            return Err(Error::InvalidParameter("height must be between 2 and 60"));
        }
        if !(1..=MAX_LAYERS).contains(&self.layers) {
            return Err(Error::InvalidParameter("layers must be between 1 and 12"));
        }
        if self.height % self.layers != 0 {
            return Err(Error::InvalidParameter(
                "height must be divisible by the number of layers",
            ));
        }
        if !(1..=MAX_TREE_HEIGHT).contains(&self.tree_height()) {
            return Err(Error::InvalidParameter(
                "height per layer must be between 1 and 20",
            ));
        }
        if !matches!(self.winternitz, 4 | 16 | 256) {
            return Err(Error::InvalidParameter(
                "winternitz parameter must be 4, 16 or 256",
            ));
        }
        if let CachePolicy::Auto { absolute_levels } = self.cache {
            if absolute_levels > MAX_TREE_HEIGHT {
                return Err(Error::InvalidParameter(
                    "cache absolute levels must be at most 20",
                ));
            }
        }
        if self.nonce_exponent > 32 {
            return Err(Error::InvalidParameter("nonce exponent must be at most 32"));
        }
        if let Some(backup) = self.backup_hash {
            if backup == self.hash {
                return Err(Error::InvalidParameter(
                    "backup hash must differ from the primary hash",
                ));
            }
            if backup.output_size() != self.hash.output_size() {
                return Err(Error::InvalidParameter(
                    "backup hash must have the primary hash's output size",
                ));
            }
        }
        Ok(())
    }

    /// Digest size `n`.
    #[must_use]
    pub const fn n(&self) -> usize {
        self.hash.output_size()
    }

    /// Height of each layer tree, `h' = h / d`.
    #[must_use]
    pub const fn tree_height(&self) -> u32 {
        if self.layers == 0 {
            0
        } else {
            self.height / self.layers
        }
    }

    /// Leaves per layer tree, `2^h'`.
    #[must_use]
    pub const fn leaves_per_tree(&self) -> u64 {
        1u64 << self.tree_height()
    }

    /// Total signatures, `2^h`.
    #[must_use]
    pub const fn max_signatures(&self) -> u64 {
        1u64 << self.height
    }

    /// WOTS+ lengths.
    #[must_use]
    pub fn wots(&self) -> WotsParams {
        WotsParams::new(self.n(), self.winternitz)
    }

    /// Encoded signature size in bytes for a given global index.
    ///
    /// Varints make the size index-dependent by a few bytes.
    #[must_use]
    pub fn signature_bytes(&self, index: u64) -> usize {
        let n = self.n();
        let wots = self.wots();
        let h_prime = self.tree_height();
        let mut size = 2 + varint_len(index) + n + 1;
        for layer in 0..self.layers {
            let leaf = leaf_index(index, layer, h_prime);
            let body = n + varint_len(u64::from(leaf)) + wots.signature_bytes() + h_prime as usize * n;
            size += 1 + varint_len(body as u64) + body;
        }
        size
    }
}

/// Leaf of global index `idx` within its layer-`layer` tree.
#[must_use]
pub const fn leaf_index(idx: u64, layer: u32, tree_height: u32) -> u32 {
    let shift = layer * tree_height;
    if shift >= 64 {
        return 0;
    }
    ((idx >> shift) & ((1u64 << tree_height) - 1)) as u32
}

/// Tree of global index `idx` within layer `layer`.
#[must_use]
pub const fn tree_index(idx: u64, layer: u32, tree_height: u32) -> u64 {
    let shift = (layer + 1) * tree_height;
    if shift >= 64 {
        0
    } else {
        idx >> shift
    }
}

/// Encoded length of an unsigned LEB128 varint.
#[must_use]
pub(crate) const fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wots_lengths() {
        let w16 = WotsParams::new(32, 16);
        assert_eq!((w16.len1, w16.len2, w16.len), (64, 3, 67));
        assert_eq!(w16.checksum_shift(), 4);
        assert_eq!(w16.checksum_bytes(), 2);

        let w4 = WotsParams::new(32, 4);
        assert_eq!((w4.len1, w4.len2, w4.len), (128, 5, 133));
        assert_eq!(w4.checksum_shift(), 6);

        let w256 = WotsParams::new(32, 256);
        assert_eq!((w256.len1, w256.len2, w256.len), (32, 2, 34));
        assert_eq!(w256.checksum_shift(), 0);
        assert_eq!(w256.checksum_bytes(), 2);

        let wide = WotsParams::new(64, 16);
        assert_eq!((wide.len1, wide.len2, wide.len), (128, 3, 131));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        assert!(Params::new(10, 1).validate().is_ok());
        assert!(Params::new(8, 2).validate().is_ok());
        assert!(Params::new(1, 1).validate().is_err());
        assert!(Params::new(61, 1).validate().is_err());
        assert!(Params::new(10, 3).validate().is_err());
        assert!(Params::new(24, 1).validate().is_err());
        assert!(Params::new(24, 0).validate().is_err());
        assert!(Params::new(26, 13).validate().is_err());
        assert!(Params::new(60, 3).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        let base = Params::new(4, 1);
        assert!(base.with_winternitz(8).validate().is_err());
        assert!(base.with_winternitz(256).validate().is_ok());
        assert!(base.with_nonce_exponent(33).validate().is_err());
        assert!(base
            .with_cache(CachePolicy::Auto { absolute_levels: 20 })
            .validate()
            .is_ok());
        assert_eq!(
            base.with_cache(CachePolicy::Auto { absolute_levels: 21 })
                .validate(),
            Err(Error::InvalidParameter("cache absolute levels must be at most 20"))
        );
        assert!(base
            .with_cache(CachePolicy::Auto { absolute_levels: u32::MAX })
            .validate()
            .is_err());
        assert!(base
            .with_backup_hash(Some(HashType::Sha2_256))
            .validate()
            .is_err());
        assert!(base
            .with_backup_hash(Some(HashType::Sha2_512))
            .validate()
            .is_err());
        assert!(base
            .with_backup_hash(Some(HashType::Sha3_256))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_thread_mode_worker_count() {
        assert_eq!(ThreadMode::Single.worker_count(16), 1);
        assert_eq!(ThreadMode::Quarter.worker_count(16), 4);
        assert_eq!(ThreadMode::Half.worker_count(16), 8);
        assert_eq!(ThreadMode::ThreeQuarters.worker_count(16), 12);
        assert_eq!(ThreadMode::Full.worker_count(16), 16);
        assert_eq!(ThreadMode::Quarter.worker_count(2), 1);
    }

    #[test]
    fn test_index_decomposition() {
        // h' = 4, two layers: idx = tree0 << 4 | leaf0
        let idx = 0b1011_0110u64;
        assert_eq!(leaf_index(idx, 0, 4), 0b0110);
        assert_eq!(tree_index(idx, 0, 4), 0b1011);
        assert_eq!(leaf_index(idx, 1, 4), 0b1011);
        assert_eq!(tree_index(idx, 1, 4), 0);
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(u64::MAX), 10);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_params_json() {
        let params: Params = serde_json::from_str(
            r#"{"height": 8, "layers": 2, "backup-hash": "shake256", "cache": {"auto": {"absolute_levels": 2}}, "threads": "three-quarters"}"#,
        )
        .unwrap();
        assert_eq!(params.height, 8);
        assert_eq!(params.layers, 2);
        assert_eq!(params.hash, HashType::Sha2_256);
        assert_eq!(params.backup_hash, Some(HashType::Shake256));
        assert_eq!(params.cache, CachePolicy::Auto { absolute_levels: 2 });
        assert_eq!(params.threads, ThreadMode::ThreeQuarters);
        assert_eq!(params.winternitz, 16);
        params.validate().unwrap();

        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(serde_json::from_str::<Params>(&json).unwrap(), params);
    }
}
