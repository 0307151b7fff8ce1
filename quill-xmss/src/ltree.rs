//! L-tree: compress a one-time public key into a single tree leaf.

use crate::address::Address;
use crate::context::Context;
use crate::params::MAX_N;
use crate::primitives::thash_h;

/// Pairwise hash `nodes` (a concatenation of n-byte values) level by level
/// until one node remains. An unpaired last node moves up unchanged.
///
/// `adrs` identifies the leaf; its level and pair index are set here.
pub fn compress(ctx: &Context, mut nodes: Vec<u8>, public_seed: &[u8], mut adrs: Address) -> Vec<u8> {
    let n = ctx.n();
    debug_assert_eq!(nodes.len() % n, 0);
    let mut count = nodes.len() / n;
    let mut height = 0;
    let mut parent = [0u8; MAX_N];

    while count > 1 {
        adrs.set_tree_height(height);
        for i in 0..count / 2 {
            adrs.set_tree_index(i as u32);
            let left = &nodes[2 * i * n..(2 * i + 1) * n];
            let right = &nodes[(2 * i + 1) * n..(2 * i + 2) * n];
            thash_h(ctx, &mut parent[..n], left, right, public_seed, &adrs);
            nodes[i * n..(i + 1) * n].copy_from_slice(&parent[..n]);
        }
        if count % 2 == 1 {
            nodes.copy_within((count - 1) * n..count * n, (count / 2) * n);
        }
        count = count.div_ceil(2);
        height += 1;
    }

    nodes.truncate(n);
    nodes
}
