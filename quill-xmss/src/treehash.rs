//! Merkle tree hashing and authentication paths.
//!
//! A [`TreeView`] is one layer tree of a private key: the seeds to derive its
//! leaves, its coordinates, and optionally its node cache. Node `(z, i)` for
//! `z > 0` is `thash_h(node(z-1, 2i), node(z-1, 2i+1))` under the hash-tree
//! address `(tree_height = z-1, tree_index = i)`; node `(0, i)` is the
//! L-tree compression of leaf `i`'s one-time public key.

use crate::address::Address;
use crate::cache::NodeCache;
use crate::context::Context;
use crate::keys::SeedView;
use crate::ltree;
use crate::parallel;
use crate::params::MAX_N;
use crate::primitives::thash_h;
use crate::wots;
use quill_core::Result;

/// Subtrees at least this tall are hashed as two parallel halves.
const PARALLEL_MIN_HEIGHT: u32 = 3;

/// One layer tree of a private key.
#[derive(Clone, Copy)]
pub struct TreeView<'a> {
    ctx: &'a Context,
    seeds: SeedView<'a>,
    layer: u32,
    tree: u64,
    cache: Option<&'a NodeCache>,
}

impl<'a> TreeView<'a> {
    /// View of tree `tree` in layer `layer`. Without a cache every node is
    /// recomputed.
    pub fn new(
        ctx: &'a Context,
        seeds: SeedView<'a>,
        layer: u32,
        tree: u64,
        cache: Option<&'a NodeCache>,
    ) -> Self {
        Self {
            ctx,
            seeds,
            layer,
            tree,
            cache,
        }
    }

    fn tree_height(&self) -> u32 {
        self.ctx.params().tree_height()
    }

    /// L-tree compressed one-time public key of `leaf`.
    pub fn leaf(&self, leaf: u32) -> Result<Vec<u8>> {
        let pk = wots::public_key(self.ctx, &self.seeds, self.layer, self.tree, leaf)?;
        Ok(ltree::compress(
            self.ctx,
            pk,
            self.seeds.public_seed,
            Address::ltree(self.layer, self.tree, leaf),
        ))
    }

    /// Node at `(height, index)`, served from the cache when present.
    pub fn node(&self, height: u32, index: u32) -> Result<Vec<u8>> {
        if let Some(node) = self.cache.and_then(|c| c.get(height, index)) {
            return Ok(node);
        }

        let node = if height == 0 {
            self.leaf(index)?
        } else {
            let (left, right) = if height >= PARALLEL_MIN_HEIGHT {
                parallel::join(
                    self.ctx,
                    || self.node(height - 1, 2 * index),
                    || self.node(height - 1, 2 * index + 1),
                )
            } else {
                (
                    self.node(height - 1, 2 * index),
                    self.node(height - 1, 2 * index + 1),
                )
            };
            let (left, right) = (left?, right?);

            let n = self.ctx.n();
            let mut parent = vec![0u8; n];
            let adrs = Address::hash_tree(self.layer, self.tree, height - 1, index);
            thash_h(self.ctx, &mut parent, &left, &right, self.seeds.public_seed, &adrs);
            parent
        };

        if let Some(cache) = self.cache {
            cache.offer(
                self.ctx.params().cache,
                self.tree_height(),
                height,
                index,
                &node,
            );
        }
        Ok(node)
    }

    /// Tree root, node `(h', 0)`.
    pub fn root(&self) -> Result<Vec<u8>> {
        self.node(self.tree_height(), 0)
    }

    /// Siblings on the path from `leaf` to the root, leaf level first.
    pub fn auth_path(&self, leaf: u32) -> Result<Vec<u8>> {
        let n = self.ctx.n();
        let h = self.tree_height();
        let mut auth = Vec::with_capacity(h as usize * n);
        for j in 0..h {
            auth.extend_from_slice(&self.node(j, (leaf >> j) ^ 1)?);
        }
        Ok(auth)
    }

    /// One-time signature of `message` under `leaf` and its authentication
    /// path.
    pub fn sign(&self, leaf: u32, message: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let ots = wots::sign(self.ctx, &self.seeds, self.layer, self.tree, leaf, message)?;
        let auth = self.auth_path(leaf)?;
        Ok((ots, auth))
    }
}

/// Recompute a tree root from a one-time signature and authentication path.
///
/// Returns `None` when a length does not match the parameters or `leaf` is
/// outside the tree.
pub fn root_from_signature(
    ctx: &Context,
    public_seed: &[u8],
    layer: u32,
    tree: u64,
    leaf: u32,
    ots: &[u8],
    auth: &[u8],
    message: &[u8],
) -> Option<Vec<u8>> {
    let n = ctx.n();
    let h = ctx.params().tree_height();
    if auth.len() != h as usize * n || u64::from(leaf) >= 1u64 << h {
        return None;
    }

    let pk = wots::public_key_from_signature(ctx, ots, message, public_seed, layer, tree, leaf)?;
    let mut node = ltree::compress(ctx, pk, public_seed, Address::ltree(layer, tree, leaf));
    let mut parent = [0u8; MAX_N];

    for (j, sibling) in auth.chunks_exact(n).enumerate() {
        let j = j as u32;
        let adrs = Address::hash_tree(layer, tree, j, leaf >> (j + 1));
        if (leaf >> j) & 1 == 0 {
            thash_h(ctx, &mut parent[..n], &node, sibling, public_seed, &adrs);
        } else {
            thash_h(ctx, &mut parent[..n], sibling, &node, public_seed, &adrs);
        }
        node.copy_from_slice(&parent[..n]);
    }

    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NonceSet;
    use crate::params::{CachePolicy, Params, ThreadMode};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    struct Fixture {
        public_seed: Vec<u8>,
        secret_seed: Vec<u8>,
        nonces: NonceSet,
    }

    impl Fixture {
        fn new() -> Self {
            let mut rng = ChaCha20Rng::seed_from_u64(42);
            Self {
                public_seed: vec![0x11; 32],
                secret_seed: vec![0x22; 32],
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

    fn context(cache: CachePolicy, threads: ThreadMode) -> Context {
        Context::new(Params::new(4, 1).with_cache(cache).with_threads(threads)).unwrap()
    }

    #[test]
    fn test_auth_path_reconstructs_root() {
        let fixture = Fixture::new();
        let ctx = context(CachePolicy::Disabled, ThreadMode::Single);
        let view = TreeView::new(&ctx, fixture.seeds(), 0, 0, None);
        let root = view.root().unwrap();

        for leaf in [0u32, 5, 15] {
            let message = [leaf as u8; 32];
            let (ots, auth) = view.sign(leaf, &message).unwrap();
            let recovered =
                root_from_signature(&ctx, &fixture.public_seed, 0, 0, leaf, &ots, &auth, &message);
            assert_eq!(recovered, Some(root.clone()), "leaf {leaf}");
        }
    }

    #[test]
    fn test_cache_does_not_change_nodes() {
        let fixture = Fixture::new();
        let plain = context(CachePolicy::Disabled, ThreadMode::Single);
        let cached = context(CachePolicy::Full, ThreadMode::Single);
        let cache = NodeCache::new(0);

        let uncached_view = TreeView::new(&plain, fixture.seeds(), 0, 0, None);
        let cached_view = TreeView::new(&cached, fixture.seeds(), 0, 0, Some(&cache));

        assert_eq!(cached_view.root().unwrap(), uncached_view.root().unwrap());
        assert_eq!(cache.len(), 31);
        assert_eq!(
            cached_view.auth_path(9).unwrap(),
            uncached_view.auth_path(9).unwrap()
        );
    }

    #[test]
    fn test_parallel_tree_matches_sequential() {
        let fixture = Fixture::new();
        let single = context(CachePolicy::Disabled, ThreadMode::Single);
        let full = context(CachePolicy::Full, ThreadMode::Full);
        let cache = NodeCache::new(0);

        let a = TreeView::new(&single, fixture.seeds(), 1, 3, None).root().unwrap();
        let b = TreeView::new(&full, fixture.seeds(), 1, 3, Some(&cache)).root().unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 31);
    }

    #[test]
    fn test_tree_coordinates_separate_roots() {
        let fixture = Fixture::new();
        let ctx = context(CachePolicy::Disabled, ThreadMode::Single);
        let a = TreeView::new(&ctx, fixture.seeds(), 0, 0, None).root().unwrap();
        let b = TreeView::new(&ctx, fixture.seeds(), 0, 1, None).root().unwrap();
        let c = TreeView::new(&ctx, fixture.seeds(), 1, 0, None).root().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_root_from_signature_rejects_bad_lengths() {
        let fixture = Fixture::new();
        let ctx = context(CachePolicy::Disabled, ThreadMode::Single);
        let view = TreeView::new(&ctx, fixture.seeds(), 0, 0, None);
        let message = [3u8; 32];
        let (ots, auth) = view.sign(2, &message).unwrap();
        let seed = &fixture.public_seed;

        assert!(root_from_signature(&ctx, seed, 0, 0, 2, &ots, &auth[32..], &message).is_none());
        assert!(root_from_signature(&ctx, seed, 0, 0, 2, &ots[1..], &auth, &message).is_none());
        assert!(root_from_signature(&ctx, seed, 0, 0, 16, &ots, &auth, &message).is_none());
    }
}
