//! Single-tree engine (XMSS).
//!
//! A single tree of height `h` whose leaf index is the signing index. The
//! engine is the one-layer case of [`XmssMt`] and shares its keys, caches
//! and encodings; its signatures are bare [`TreeSignature`]s.

use crate::keys::{CommittedIndex, NonceSet, PrivateKey, PublicKey};
use crate::params::Params;
use crate::xmss_mt::{MultiTreeSignature, XmssMt};
use quill_core::{Error, Result, StatefulSigner};
use rand_core::CryptoRng;

/// Signature of one tree: one layer of a multi-tree signature, or a whole
/// single-tree signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeSignature {
    /// Layer of the signing tree (0 = bottom).
    pub layer: u32,
    /// Message randomizer.
    pub r: Vec<u8>,
    /// Leaf used within the tree.
    pub leaf: u32,
    /// One-time signature, `len` chain values.
    pub ots: Vec<u8>,
    /// Authentication path, `h'` nodes from leaf to root.
    pub auth: Vec<u8>,
}

/// Single-tree signature engine.
#[derive(Debug)]
pub struct Xmss {
    inner: XmssMt,
}

impl Xmss {
    /// Validate `params`, which must describe exactly one layer.
    pub fn new(params: Params) -> Result<Self> {
        if params.layers != 1 {
            return Err(Error::InvalidParameter(
                "single-tree engine requires exactly one layer",
            ));
        }
        Ok(Self {
            inner: XmssMt::new(params)?,
        })
    }

    /// Engine parameters.
    pub fn params(&self) -> &Params {
        self.inner.params()
    }

    /// The equivalent one-layer multi-tree engine.
    pub fn as_multi_tree(&self) -> &XmssMt {
        &self.inner
    }

    /// Generate a key pair from fresh randomness.
    pub fn generate_keys(&self, rng: &mut impl CryptoRng) -> Result<(PrivateKey, PublicKey)> {
        self.inner.generate_keys(rng)
    }

    /// Generate a key pair deterministically from explicit seeds and nonces.
    pub fn generate_keys_from_seeds(
        &self,
        public_seed: &[u8],
        secret_seed: &[u8],
        secret_prf: &[u8],
        nonces: NonceSet,
    ) -> Result<(PrivateKey, PublicKey)> {
        self.inner
            .generate_keys_from_seeds(public_seed, secret_seed, secret_prf, nonces)
    }

    /// Sign with the next index, advancing the key in memory.
    pub fn sign(&self, sk: &mut PrivateKey, message: &[u8]) -> Result<TreeSignature> {
        into_tree(self.inner.sign(sk, message)?)
    }

    /// Sign at a committed index.
    pub fn sign_committed(
        &self,
        sk: &mut PrivateKey,
        committed: CommittedIndex,
        message: &[u8],
    ) -> Result<TreeSignature> {
        into_tree(self.inner.sign_committed(sk, committed, message)?)
    }

    /// Verify a signature. Any mismatch is `false`.
    pub fn verify(&self, signature: &TreeSignature, message: &[u8], pk: &PublicKey) -> bool {
        self.inner
            .verify(&MultiTreeSignature::from(signature.clone()), message, pk)
    }

    /// Decode and verify. Errors only for input that cannot be parsed.
    pub fn verify_bytes(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> Result<bool> {
        self.inner.verify_bytes(signature, message, public_key)
    }

    /// Run the cache eviction pass for the key's current index.
    pub fn evict_auth_nodes(&self, sk: &mut PrivateKey) -> usize {
        self.inner.evict_auth_nodes(sk)
    }
}

fn into_tree(signature: MultiTreeSignature) -> Result<TreeSignature> {
    signature
        .layers
        .into_iter()
        .next()
        .ok_or(Error::Encoding("signature has no layers"))
}

impl StatefulSigner for Xmss {
    type SigningKey = PrivateKey;
    type VerificationKey = PublicKey;

    fn generate_keys(&self, rng: &mut impl CryptoRng) -> Result<(PrivateKey, PublicKey)> {
        Xmss::generate_keys(self, rng)
    }

    fn sign(&self, sk: &mut PrivateKey, message: &[u8]) -> Result<Vec<u8>> {
        let signature = Xmss::sign(self, sk, message)?;
        Ok(MultiTreeSignature::from(signature).to_bytes())
    }

    fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> Result<bool> {
        self.verify_bytes(signature, message, public_key)
    }

    fn remaining(&self, sk: &PrivateKey) -> u64 {
        sk.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::CachePolicy;
    use crate::treehash::TreeView;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keys(xmss: &Xmss) -> (PrivateKey, PublicKey) {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        xmss.generate_keys(&mut rng).unwrap()
    }

    #[test]
    fn test_rejects_multiple_layers() {
        assert!(matches!(
            Xmss::new(Params::new(4, 2)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_sign_verify_every_leaf() {
        let xmss = Xmss::new(Params::new(3, 1)).unwrap();
        let (mut sk, pk) = keys(&xmss);

        for leaf in 0..8u32 {
            let sig = xmss.sign(&mut sk, b"message").unwrap();
            assert_eq!(sig.leaf, leaf);
            assert_eq!(sig.auth.len(), 3 * 32);
            assert_eq!(sig.ots.len(), 67 * 32);
            assert!(xmss.verify(&sig, b"message", &pk));
        }
        assert_eq!(
            xmss.sign(&mut sk, b"message"),
            Err(Error::KeysExhausted { max: 8 })
        );
    }

    #[test]
    fn test_cached_auth_path_matches_recomputed() {
        for policy in [
            CachePolicy::Full,
            CachePolicy::Auto { absolute_levels: 1 },
            CachePolicy::Disabled,
        ] {
            let xmss = Xmss::new(Params::new(4, 1).with_cache(policy)).unwrap();
            let (mut sk, _) = keys(&xmss);
            for _ in 0..5 {
                xmss.sign(&mut sk, b"advance").unwrap();
            }

            let next = sk.index() as u32;
            let (seeds, caches) = sk.split_mut();
            let ctx = xmss.as_multi_tree().context();
            let cached = TreeView::new(ctx, seeds, 0, 0, caches.tree(0, 0))
                .auth_path(next)
                .unwrap();
            let fresh = TreeView::new(ctx, seeds, 0, 0, None)
                .auth_path(next)
                .unwrap();
            assert_eq!(cached, fresh, "{policy:?}");
        }
    }

    #[test]
    fn test_evict_is_idempotent() {
        let xmss = Xmss::new(Params::new(4, 1).with_cache(CachePolicy::Full)).unwrap();
        let (mut sk, _) = keys(&xmss);
        xmss.sign(&mut sk, b"m").unwrap();
        let remaining = sk.cache().node_count();
        assert_eq!(xmss.evict_auth_nodes(&mut sk), 0);
        assert_eq!(sk.cache().node_count(), remaining);
    }
}
