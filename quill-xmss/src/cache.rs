//! Authentication-path node cache.
//!
//! Each layer tree of a private key owns a [`NodeCache`] mapping
//! `(height, index)` to a computed interior node. Nodes are offered to the
//! cache as tree hashing computes them and the cache keeps those its
//! [`CachePolicy`] asks for. Eviction happens only in an explicit pass
//! ([`CacheSet::clean_auth_tree`]); reads never evict.
//!
//! A node `(z, i)` of a tree of height `h'` is *reachable* from cursor `c`
//! (the next leaf to sign in that tree) when `z == h'` or `i ^ 1 >= c >> z`:
//! either it is the tree root, or it is the sibling on the path of some leaf
//! at or after `c`.

use crate::params::{leaf_index, tree_index, CachePolicy};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Whether node `(height, index)` can appear on a future authentication path.
#[must_use]
pub fn is_reachable(tree_height: u32, cursor: u64, height: u32, index: u64) -> bool {
    height == tree_height || (index ^ 1) >= (cursor >> height)
}

fn should_keep(policy: CachePolicy, tree_height: u32, cursor: u64, height: u32, index: u64) -> bool {
    if !is_reachable(tree_height, cursor, height, index) {
        return false;
    }
    match policy {
        CachePolicy::Disabled => false,
        CachePolicy::Full => true,
        CachePolicy::Auto { absolute_levels } => {
            absolute_levels >= tree_height.saturating_sub(height)
                || index == (cursor >> height) ^ 1
                || index == ((cursor + 1) >> height) ^ 1
        }
    }
}

/// Interior nodes of one layer tree.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: RwLock<HashMap<(u32, u32), Vec<u8>>>,
    cursor: u64,
}

impl NodeCache {
    /// Empty cache positioned at leaf `cursor`.
    #[must_use]
    pub fn new(cursor: u64) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            cursor,
        }
    }

    /// Next leaf to be signed in this tree.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Cached node, if present.
    pub fn get(&self, height: u32, index: u32) -> Option<Vec<u8>> {
        self.nodes.read().get(&(height, index)).cloned()
    }

    /// Number of cached nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether the cache holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Offer a freshly computed node. Returns whether it was kept.
    pub fn offer(
        &self,
        policy: CachePolicy,
        tree_height: u32,
        height: u32,
        index: u32,
        node: &[u8],
    ) -> bool {
        if !should_keep(policy, tree_height, self.cursor, height, u64::from(index)) {
            return false;
        }
        self.nodes
            .write()
            .entry((height, index))
            .or_insert_with(|| node.to_vec());
        true
    }

    /// Store a node unconditionally (used when decoding a persisted cache).
    pub fn insert(&mut self, height: u32, index: u32, node: Vec<u8>) {
        self.nodes.get_mut().insert((height, index), node);
    }

    /// Cached nodes sorted by `(height, index)`.
    pub fn entries(&self) -> Vec<((u32, u32), Vec<u8>)> {
        let mut entries: Vec<_> = self
            .nodes
            .read()
            .iter()
            .map(|(&k, v)| (k, v.clone()))
            .collect();
        entries.sort_unstable_by_key(|(k, _)| *k);
        entries
    }

    /// Move the cursor and evict every node the policy no longer needs.
    /// Returns the number of evicted nodes.
    pub fn shake(&mut self, policy: CachePolicy, tree_height: u32, cursor: u64) -> usize {
        self.cursor = cursor;
        let nodes = self.nodes.get_mut();
        let before = nodes.len();
        nodes.retain(|&(height, index), _| {
            should_keep(policy, tree_height, cursor, height, u64::from(index))
        });
        before - nodes.len()
    }
}

/// Every node cache of a private key, keyed by `(layer, tree)`.
#[derive(Debug, Default)]
pub struct CacheSet {
    trees: BTreeMap<(u32, u64), NodeCache>,
}

impl CacheSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache of a tree, if one exists.
    pub fn tree(&self, layer: u32, tree: u64) -> Option<&NodeCache> {
        self.trees.get(&(layer, tree))
    }

    /// Cache of a tree, created at `cursor` if missing.
    pub fn tree_or_insert(&mut self, layer: u32, tree: u64, cursor: u64) -> &NodeCache {
        self.trees
            .entry((layer, tree))
            .or_insert_with(|| NodeCache::new(cursor))
    }

    /// Install a decoded tree cache.
    pub fn insert_tree(&mut self, layer: u32, tree: u64, cache: NodeCache) {
        self.trees.insert((layer, tree), cache);
    }

    /// Iterate over `((layer, tree), cache)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&(u32, u64), &NodeCache)> {
        self.trees.iter()
    }

    /// Number of tree caches.
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Total cached nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.trees.values().map(NodeCache::len).sum()
    }

    /// Drop every cache.
    pub fn clear(&mut self) {
        self.trees.clear();
    }

    /// Evict everything no future signature can use, given the next index
    /// to be signed. Returns the number of evicted nodes.
    ///
    /// Caches of trees that are not active at `next_index` are dropped; the
    /// active tree of every layer keeps only what its policy needs from the
    /// new cursor on. An exhausted key keeps nothing.
    pub fn clean_auth_tree(
        &mut self,
        policy: CachePolicy,
        tree_height: u32,
        layers: u32,
        next_index: u64,
        max_signatures: u64,
    ) -> usize {
        if next_index >= max_signatures {
            let evicted = self.node_count();
            self.trees.clear();
            debug!(evicted, "key exhausted, dropped node caches");
            return evicted;
        }

        let mut evicted = 0;
        self.trees.retain(|&(layer, tree), cache| {
            let active = layer < layers && tree == tree_index(next_index, layer, tree_height);
            if active {
                let cursor = u64::from(leaf_index(next_index, layer, tree_height));
                evicted += cache.shake(policy, tree_height, cursor);
            } else {
                evicted += cache.len();
            }
            active
        });

        debug!(
            next_index,
            evicted,
            remaining = self.node_count(),
            "cleaned authentication tree caches"
        );
        evicted
    }
}
