//! Multi-tree engine (XMSS^MT).
//!
//! `d` layers of trees of height `h' = h / d`. Layer 0 signs message
//! digests; every tree above signs the root of the current tree of the layer
//! below. The public root is the root of the single tree in the top layer.
//! Lower trees are built lazily the first time an index reaches them.
//!
//! A global index `idx` decomposes per layer `l` into
//! `leaf_l = (idx >> l·h') mod 2^h'` and `tree_l = idx >> (l+1)·h'`.

use crate::cache::CacheSet;
use crate::context::Context;
use crate::keys::{CommittedIndex, NonceSet, PrivateKey, PublicKey, SeedView};
use crate::params::{leaf_index, tree_index, Params};
use crate::primitives::{h_msg, prf_index};
use crate::treehash::{root_from_signature, TreeView};
use crate::xmss::TreeSignature;
use subtle::ConstantTimeEq;
use quill_core::{Error, Result, StatefulSigner, Zeroizing};
use rand_core::{CryptoRng, RngCore};
use tracing::debug;

/// Digest a signature was produced under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DigestSelector {
    /// The key's primary digest.
    #[default]
    Primary,
    /// The key's backup digest.
    Backup,
}

impl DigestSelector {
    /// Signature type byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            DigestSelector::Primary => 0,
            DigestSelector::Backup => 1,
        }
    }

    /// Parse a signature type byte.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(DigestSelector::Primary),
            1 => Ok(DigestSelector::Backup),
            _ => Err(Error::Encoding("unknown signature type")),
        }
    }
}

/// Signature over all layers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiTreeSignature {
    /// Digest the signature was produced under.
    pub selector: DigestSelector,
    /// Global signing index.
    pub index: u64,
    /// Message randomizer.
    pub r: Vec<u8>,
    /// One tree signature per layer, bottom first.
    pub layers: Vec<TreeSignature>,
}

impl From<TreeSignature> for MultiTreeSignature {
    /// Wrap a single-tree signature; its leaf is the global index.
    fn from(signature: TreeSignature) -> Self {
        Self {
            selector: DigestSelector::Primary,
            index: u64::from(signature.leaf),
            r: signature.r.clone(),
            layers: vec![signature],
        }
    }
}

/// Multi-tree signature engine.
#[derive(Debug)]
pub struct XmssMt {
    params: Params,
    primary: Context,
    backup: Option<Context>,
}

impl XmssMt {
    /// Validate `params` and build the execution contexts.
    pub fn new(params: Params) -> Result<Self> {
        let primary = Context::new(params)?;
        let backup = params.backup_hash.map(|hash| primary.with_digest(hash));
        Ok(Self {
            params,
            primary,
            backup,
        })
    }

    /// Engine parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Execution context of the primary digest.
    pub fn context(&self) -> &Context {
        &self.primary
    }

    fn context_for(&self, selector: DigestSelector) -> Option<&Context> {
        match selector {
            DigestSelector::Primary => Some(&self.primary),
            DigestSelector::Backup => self.backup.as_ref(),
        }
    }

    /// Generate a key pair from fresh randomness.
    pub fn generate_keys(&self, rng: &mut impl CryptoRng) -> Result<(PrivateKey, PublicKey)> {
        let n = self.params.n();
        let mut public_seed = vec![0u8; n];
        let mut secret_seed = Zeroizing::new(vec![0u8; n]);
        let mut secret_prf = Zeroizing::new(vec![0u8; n]);
        rng.fill_bytes(&mut public_seed);
        rng.fill_bytes(&mut secret_seed);
        rng.fill_bytes(&mut secret_prf);
        let nonces = NonceSet::generate(
            rng,
            self.params.leaves_per_tree() as usize,
            self.params.nonce_exponent,
        );
        self.generate_keys_from_seeds(&public_seed, &secret_seed, &secret_prf, nonces)
    }

    /// Generate a key pair deterministically from explicit seeds and nonces.
    pub fn generate_keys_from_seeds(
        &self,
        public_seed: &[u8],
        secret_seed: &[u8],
        secret_prf: &[u8],
        nonces: NonceSet,
    ) -> Result<(PrivateKey, PublicKey)> {
        let n = self.params.n();
        for (field, value) in [
            ("public seed", public_seed),
            ("secret seed", secret_seed),
            ("secret prf", secret_prf),
        ] {
            if value.len() != n {
                return Err(Error::InvalidLength {
                    field,
                    expected: n,
                    actual: value.len(),
                });
            }
        }
        let leaves = self.params.leaves_per_tree() as usize;
        if nonces.len() != leaves {
            return Err(Error::InvalidLength {
                field: "nonce table",
                expected: leaves,
                actual: nonces.len(),
            });
        }

        let top = self.params.layers - 1;
        let seeds = SeedView {
            public_seed,
            secret_seed,
            nonces: &nonces,
        };
        let mut cache = CacheSet::new();
        let root = {
            let top_cache = cache.tree_or_insert(top, 0, 0);
            TreeView::new(&self.primary, seeds, top, 0, Some(top_cache)).root()?
        };
        let backup_root = match &self.backup {
            Some(ctx) => Some(TreeView::new(ctx, seeds, top, 0, None).root()?),
            None => None,
        };

        debug!(
            height = self.params.height,
            layers = self.params.layers,
            hash = %self.params.hash,
            cached_nodes = cache.node_count(),
            "generated key pair"
        );

        let sk = PrivateKey {
            height: self.params.height,
            layers: self.params.layers,
            hash: self.params.hash,
            backup_hash: self.params.backup_hash,
            nonce_exponent: self.params.nonce_exponent,
            index: 0,
            public_seed: public_seed.to_vec(),
            secret_seed: Zeroizing::new(secret_seed.to_vec()),
            secret_prf: Zeroizing::new(secret_prf.to_vec()),
            root,
            backup_root,
            nonces,
            cache,
        };
        let pk = sk.public_key();
        Ok((sk, pk))
    }

    /// Reject a key produced under different parameters.
    pub fn check_key(&self, sk: &PrivateKey) -> Result<()> {
        if sk.height != self.params.height {
            return Err(Error::ParameterMismatch("height"));
        }
        if sk.layers != self.params.layers {
            return Err(Error::ParameterMismatch("layers"));
        }
        if sk.hash != self.params.hash {
            return Err(Error::ParameterMismatch("hash"));
        }
        if sk.backup_hash != self.params.backup_hash {
            return Err(Error::ParameterMismatch("backup hash"));
        }
        if sk.nonces.len() as u64 != self.params.leaves_per_tree() {
            return Err(Error::ParameterMismatch("nonce table"));
        }
        Ok(())
    }

    /// Sign with the next index under the primary digest.
    ///
    /// The index is advanced in memory only. Use this path when the storage
    /// layer persists the key atomically with releasing the signature;
    /// otherwise reserve, persist, commit and call
    /// [`sign_committed`](Self::sign_committed).
    pub fn sign(&self, sk: &mut PrivateKey, message: &[u8]) -> Result<MultiTreeSignature> {
        self.sign_with(sk, message, DigestSelector::Primary)
    }

    /// Sign with the next index under the chosen digest.
    pub fn sign_with(
        &self,
        sk: &mut PrivateKey,
        message: &[u8],
        selector: DigestSelector,
    ) -> Result<MultiTreeSignature> {
        self.check_key(sk)?;
        let committed = sk.reserve_next_index()?.commit();
        self.sign_committed_with(sk, committed, message, selector)
    }

    /// Sign at a committed index under the primary digest.
    pub fn sign_committed(
        &self,
        sk: &mut PrivateKey,
        committed: CommittedIndex,
        message: &[u8],
    ) -> Result<MultiTreeSignature> {
        self.sign_committed_with(sk, committed, message, DigestSelector::Primary)
    }

    /// Sign at a committed index under the chosen digest.
    ///
    /// Primary signatures serve nodes from the key's caches and clean them
    /// afterwards; backup signatures recompute every node.
    pub fn sign_committed_with(
        &self,
        sk: &mut PrivateKey,
        committed: CommittedIndex,
        message: &[u8],
        selector: DigestSelector,
    ) -> Result<MultiTreeSignature> {
        self.check_key(sk)?;
        sk.check_committed(&committed)?;

        let ctx = self
            .context_for(selector)
            .ok_or(Error::MissingKeyMaterial("backup hash"))?;
        let root = match selector {
            DigestSelector::Primary => sk.root.clone(),
            DigestSelector::Backup => sk
                .backup_root
                .clone()
                .ok_or(Error::MissingKeyMaterial("backup root"))?,
        };

        let n = ctx.n();
        let h = self.params.tree_height();
        let policy = self.params.cache;
        let index = committed.index();
        let next_index = sk.index;

        let mut r = vec![0u8; n];
        prf_index(ctx, &mut r, &sk.secret_prf, index);
        let mut node = vec![0u8; n];
        h_msg(ctx, &mut node, &r, &root, index, message);

        let (seeds, caches) = sk.split_mut();
        let mut layers = Vec::with_capacity(self.params.layers as usize);

        for layer in 0..self.params.layers {
            let tree = tree_index(index, layer, h);
            let leaf = leaf_index(index, layer, h);
            let cache = match selector {
                DigestSelector::Primary => Some(caches.tree_or_insert(layer, tree, u64::from(leaf))),
                DigestSelector::Backup => None,
            };

            let view = TreeView::new(ctx, seeds, layer, tree, cache);
            let (ots, auth) = view.sign(leaf, &node)?;

            if layer + 1 < self.params.layers {
                // The layer above signs this tree's root.
                node = match cache.and_then(|c| c.get(h, 0)) {
                    Some(tree_root) => tree_root,
                    None => {
                        let tree_root = root_from_signature(
                            ctx,
                            seeds.public_seed,
                            layer,
                            tree,
                            leaf,
                            &ots,
                            &auth,
                            &node,
                        )
                        .ok_or(Error::InvalidParameter("tree signature has inconsistent lengths"))?;
                        if let Some(cache) = cache {
                            cache.offer(policy, h, h, 0, &tree_root);
                        }
                        tree_root
                    }
                };
            }

            layers.push(TreeSignature {
                layer,
                r: r.clone(),
                leaf,
                ots,
                auth,
            });
        }

        if selector == DigestSelector::Primary {
            caches.clean_auth_tree(
                policy,
                h,
                self.params.layers,
                next_index,
                self.params.max_signatures(),
            );
        }

        debug!(index, ?selector, "signed message");
        Ok(MultiTreeSignature {
            selector,
            index,
            r,
            layers,
        })
    }

    /// Verify a decoded signature. Never fails: any mismatch is `false`.
    pub fn verify(&self, signature: &MultiTreeSignature, message: &[u8], pk: &PublicKey) -> bool {
        let Some(ctx) = self.context_for(signature.selector) else {
            return false;
        };
        let root = match signature.selector {
            DigestSelector::Primary => pk.root.as_slice(),
            DigestSelector::Backup => match pk.backup_root.as_deref() {
                Some(root) => root,
                None => return false,
            },
        };

        let n = ctx.n();
        let h = self.params.tree_height();
        if signature.layers.len() != self.params.layers as usize
            || signature.index >= self.params.max_signatures()
            || signature.r.len() != n
            || root.len() != n
            || pk.public_seed.len() != n
        {
            return false;
        }

        let mut node = vec![0u8; n];
        h_msg(ctx, &mut node, &signature.r, root, signature.index, message);

        for (layer, element) in (0u32..).zip(&signature.layers) {
            let tree = tree_index(signature.index, layer, h);
            let leaf = leaf_index(signature.index, layer, h);
            if element.layer != layer || element.leaf != leaf || element.r.len() != n {
                return false;
            }
            if !bool::from(element.r.ct_eq(&signature.r)) {
                return false;
            }
            node = match root_from_signature(
                ctx,
                &pk.public_seed,
                layer,
                tree,
                leaf,
                &element.ots,
                &element.auth,
                &node,
            ) {
                Some(next) => next,
                None => return false,
            };
        }

        node.ct_eq(root).into()
    }

    /// Decode and verify. Errors only for input that cannot be parsed.
    pub fn verify_bytes(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> Result<bool> {
        let pk = PublicKey::from_bytes(public_key, self.params.hash)?;
        let signature =
            MultiTreeSignature::from_bytes(signature, self.params.n(), self.params.tree_height())?;
        Ok(self.verify(&signature, message, &pk))
    }

    /// Run the cache eviction pass for the key's current index. Returns the
    /// number of evicted nodes.
    pub fn evict_auth_nodes(&self, sk: &mut PrivateKey) -> usize {
        let next_index = sk.index;
        sk.cache.clean_auth_tree(
            self.params.cache,
            self.params.tree_height(),
            self.params.layers,
            next_index,
            self.params.max_signatures(),
        )
    }
}

impl StatefulSigner for XmssMt {
    type SigningKey = PrivateKey;
    type VerificationKey = PublicKey;

    fn generate_keys(&self, rng: &mut impl CryptoRng) -> Result<(PrivateKey, PublicKey)> {
        XmssMt::generate_keys(self, rng)
    }

    fn sign(&self, sk: &mut PrivateKey, message: &[u8]) -> Result<Vec<u8>> {
        Ok(XmssMt::sign(self, sk, message)?.to_bytes())
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
    use crate::cache::is_reachable;
    use crate::hash::HashType;
    use crate::params::CachePolicy;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn engine(params: Params) -> XmssMt {
        XmssMt::new(params).unwrap()
    }

    #[test]
    fn test_sign_verify_two_layers() {
        let mt = engine(Params::new(4, 2));
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();

        for i in 0..6u64 {
            let message = format!("message {i}");
            let sig = mt.sign(&mut sk, message.as_bytes()).unwrap();
            assert_eq!(sig.index, i);
            assert_eq!(sig.layers.len(), 2);
            assert!(mt.verify(&sig, message.as_bytes(), &pk));
            assert!(!mt.verify(&sig, b"other", &pk));
        }
    }

    #[test]
    fn test_structural_mismatch_is_false() {
        let mt = engine(Params::new(4, 2));
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();
        let sig = mt.sign(&mut sk, b"m").unwrap();

        let mut wrong_layer = sig.clone();
        wrong_layer.layers[1].layer = 0;
        assert!(!mt.verify(&wrong_layer, b"m", &pk));

        let mut wrong_leaf = sig.clone();
        wrong_leaf.layers[0].leaf = 1;
        assert!(!mt.verify(&wrong_leaf, b"m", &pk));

        let mut wrong_r = sig.clone();
        wrong_r.layers[1].r[0] ^= 1;
        assert!(!mt.verify(&wrong_r, b"m", &pk));

        let mut missing_layer = sig.clone();
        missing_layer.layers.pop();
        assert!(!mt.verify(&missing_layer, b"m", &pk));

        let mut short_auth = sig.clone();
        short_auth.layers[0].auth.truncate(32);
        assert!(!mt.verify(&short_auth, b"m", &pk));

        let mut backup = sig;
        backup.selector = DigestSelector::Backup;
        assert!(!mt.verify(&backup, b"m", &pk));
    }

    #[test]
    fn test_backup_digest() {
        let params = Params::new(4, 2).with_backup_hash(Some(HashType::Sha3_256));
        let mt = engine(params);
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();
        assert!(pk.backup_root().is_some());
        assert_ne!(pk.backup_root(), Some(pk.root()));

        let primary = mt.sign(&mut sk, b"m").unwrap();
        let backup = mt.sign_with(&mut sk, b"m", DigestSelector::Backup).unwrap();
        assert_eq!(backup.index, 1);
        assert!(mt.verify(&primary, b"m", &pk));
        assert!(mt.verify(&backup, b"m", &pk));

        let mut relabeled = backup;
        relabeled.selector = DigestSelector::Primary;
        assert!(!mt.verify(&relabeled, b"m", &pk));
    }

    #[test]
    fn test_backup_requires_configuration() {
        let mt = engine(Params::new(4, 1));
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (mut sk, _) = mt.generate_keys(&mut rng).unwrap();
        assert_eq!(
            mt.sign_with(&mut sk, b"m", DigestSelector::Backup),
            Err(Error::MissingKeyMaterial("backup hash"))
        );
    }

    #[test]
    fn test_key_parameters_enforced() {
        let small = engine(Params::new(4, 1));
        let other = engine(Params::new(4, 2));
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (mut sk, _) = small.generate_keys(&mut rng).unwrap();
        assert_eq!(
            other.sign(&mut sk, b"m"),
            Err(Error::ParameterMismatch("layers"))
        );
        // A rejected key keeps its index.
        assert_eq!(sk.index(), 0);
    }

    #[test]
    fn test_caches_hold_only_reachable_nodes() {
        let mt = engine(Params::new(6, 2).with_cache(CachePolicy::Full));
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();

        for _ in 0..11 {
            let sig = mt.sign(&mut sk, b"m").unwrap();
            assert!(mt.verify(&sig, b"m", &pk));
            let next = sk.index();
            for (&(layer, tree), cache) in sk.cache().iter() {
                assert_eq!(tree, tree_index(next, layer, 3));
                for ((height, index), _) in cache.entries() {
                    assert!(is_reachable(3, cache.cursor(), height, u64::from(index)));
                }
            }
        }
    }

    #[test]
    fn test_committed_flow() {
        let mt = engine(Params::new(4, 1));
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();

        let reservation = sk.reserve_next_index().unwrap();
        assert_eq!(reservation.index(), 0);
        assert_eq!(sk.index(), 1);
        let sig = mt.sign_committed(&mut sk, reservation.commit(), b"m").unwrap();
        assert_eq!(sig.index, 0);
        assert!(mt.verify(&sig, b"m", &pk));
    }

    #[test]
    fn test_stateful_signer_trait() {
        fn roundtrip<S: StatefulSigner>(scheme: &S) -> bool {
            let mut rng = ChaCha20Rng::seed_from_u64(13);
            let (mut sk, _pk) = scheme.generate_keys(&mut rng).unwrap();
            let before = scheme.remaining(&sk);
            let sig = scheme.sign(&mut sk, b"trait").unwrap();
            assert_eq!(scheme.remaining(&sk), before - 1);
            !sig.is_empty()
        }

        let mt = engine(Params::new(4, 2));
        assert!(roundtrip(&mt));

        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let (mut sk, pk) = mt.generate_keys(&mut rng).unwrap();
        let sig = StatefulSigner::sign(&mt, &mut sk, b"bytes").unwrap();
        assert!(StatefulSigner::verify(&mt, &sig, b"bytes", &pk.to_bytes()).unwrap());
        assert!(!StatefulSigner::verify(&mt, &sig, b"other", &pk.to_bytes()).unwrap());
    }
}
