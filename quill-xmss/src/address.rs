//! Hash addresses for domain separation.
//!
//! Every tweakable hash call is keyed by the position it computes: a chain
//! step inside a one-time key, a level of an L-tree, or a node of a Merkle
//! tree. The position is a closed tagged union serialized to 32 bytes of
//! big-endian words:
//!
//! | Word | Bytes | OTS | L-tree | Hash tree |
//! |------|-------|-----|--------|-----------|
//! | 0 | 0-3 | layer | layer | layer |
//! | 1-2 | 4-11 | tree | tree | tree |
//! | 3 | 12-15 | type = 0 | type = 1 | type = 2 |
//! | 4 | 16-19 | OTS index | L-tree index | padding |
//! | 5 | 20-23 | chain | tree height | tree height |
//! | 6 | 24-27 | hash | tree index | tree index |
//! | 7 | 28-31 | key and mask | key and mask | key and mask |

/// Address size in bytes.
pub const ADDRESS_BYTES: usize = 32;

/// Variant-specific address fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressKind {
    /// Chain step inside a one-time key.
    Ots {
        /// Leaf (one-time key) index within the tree.
        ots_index: u32,
        /// Chain index within the one-time key.
        chain: u32,
        /// Step within the chain.
        hash: u32,
    },
    /// Node of the L-tree compressing a one-time public key.
    LTree {
        /// Leaf whose public key is being compressed.
        ltree_index: u32,
        /// Level within the L-tree.
        tree_height: u32,
        /// Pair index within the level.
        tree_index: u32,
    },
    /// Node of a Merkle tree.
    HashTree {
        /// Height of the children being hashed.
        tree_height: u32,
        /// Index of the parent node within its level.
        tree_index: u32,
    },
}

impl AddressKind {
    const fn type_code(&self) -> u32 {
        match self {
            AddressKind::Ots { .. } => 0,
            AddressKind::LTree { .. } => 1,
            AddressKind::HashTree { .. } => 2,
        }
    }
}

/// Position of a hash call in the construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Address {
    /// Layer in a multi-tree key (0 = bottom).
    pub layer: u32,
    /// Tree index within the layer.
    pub tree: u64,
    /// Selects key (0) or bitmask (1, 2) derivation.
    pub key_and_mask: u32,
    /// Variant fields.
    pub kind: AddressKind,
}

impl Address {
    /// One-time signature address at chain 0, step 0.
    #[must_use]
    pub const fn ots(layer: u32, tree: u64, ots_index: u32) -> Self {
        Self {
            layer,
            tree,
            key_and_mask: 0,
            kind: AddressKind::Ots {
                ots_index,
                chain: 0,
                hash: 0,
            },
        }
    }

    /// L-tree address at level 0, pair 0.
    #[must_use]
    pub const fn ltree(layer: u32, tree: u64, ltree_index: u32) -> Self {
        Self {
            layer,
            tree,
            key_and_mask: 0,
            kind: AddressKind::LTree {
                ltree_index,
                tree_height: 0,
                tree_index: 0,
            },
        }
    }

    /// Hash-tree address for the parent `tree_index` of two children at `tree_height`.
    #[must_use]
    pub const fn hash_tree(layer: u32, tree: u64, tree_height: u32, tree_index: u32) -> Self {
        Self {
            layer,
            tree,
            key_and_mask: 0,
            kind: AddressKind::HashTree {
                tree_height,
                tree_index,
            },
        }
    }

    /// Set the chain index (OTS addresses only).
    pub fn set_chain(&mut self, value: u32) {
        if let AddressKind::Ots { chain, hash, .. } = &mut self.kind {
            *chain = value;
            *hash = 0;
        }
    }

    /// Set the chain step (OTS addresses only).
    pub fn set_hash(&mut self, value: u32) {
        if let AddressKind::Ots { hash, .. } = &mut self.kind {
            *hash = value;
        }
    }

    /// Set the level (L-tree and hash-tree addresses).
    pub fn set_tree_height(&mut self, value: u32) {
        match &mut self.kind {
            AddressKind::LTree { tree_height, .. } | AddressKind::HashTree { tree_height, .. } => {
                *tree_height = value;
            }
            AddressKind::Ots { .. } => {}
        }
    }

    /// Set the index within the level (L-tree and hash-tree addresses).
    pub fn set_tree_index(&mut self, value: u32) {
        match &mut self.kind {
            AddressKind::LTree { tree_index, .. } | AddressKind::HashTree { tree_index, .. } => {
                *tree_index = value;
            }
            AddressKind::Ots { .. } => {}
        }
    }

    /// Copy with a different key-and-mask selector.
    #[must_use]
    pub const fn with_key_and_mask(mut self, value: u32) -> Self {
        self.key_and_mask = value;
        self
    }

    /// Serialize to the 32-byte hashing layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; ADDRESS_BYTES] {
        let (w4, w5, w6) = match self.kind {
            AddressKind::Ots {
                ots_index,
                chain,
                hash,
            } => (ots_index, chain, hash),
            AddressKind::LTree {
                ltree_index,
                tree_height,
                tree_index,
            } => (ltree_index, tree_height, tree_index),
            AddressKind::HashTree {
                tree_height,
                tree_index,
            } => (0, tree_height, tree_index),
        };

        let mut bytes = [0u8; ADDRESS_BYTES];
        bytes[0..4].copy_from_slice(&self.layer.to_be_bytes());
        bytes[4..12].copy_from_slice(&self.tree.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.kind.type_code().to_be_bytes());
        bytes[16..20].copy_from_slice(&w4.to_be_bytes());
        bytes[20..24].copy_from_slice(&w5.to_be_bytes());
        bytes[24..28].copy_from_slice(&w6.to_be_bytes());
        bytes[28..32].copy_from_slice(&self.key_and_mask.to_be_bytes());
        bytes
    }
}
