//! Key types and the stateful index contract.
//!
//! The signing index is the one piece of mutable state in a private key and
//! reusing an index breaks the scheme. Signing therefore goes through two
//! steps:
//!
//! 1. [`PrivateKey::reserve_next_index`] advances the in-memory index and
//!    hands out an [`IndexReservation`]. The caller persists the key.
//! 2. [`IndexReservation::commit`] turns the reservation into a
//!    [`CommittedIndex`] once persistence succeeded; only a committed index
//!    can be signed with.
//!
//! A crash between the two steps loses an index, never reuses one.

use crate::cache::CacheSet;
use crate::hash::HashType;
use subtle::{Choice, ConstantTimeEq};
use quill_core::{Error, Result, Zeroizing};
use rand_core::{CryptoRng, RngCore};
use tracing::warn;

/// Per-leaf nonce pair mixed into one-time key derivation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Nonce {
    /// First nonce.
    pub first: u32,
    /// Second nonce.
    pub second: u32,
}

/// One nonce pair per leaf of a layer tree, shared by every tree and layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonceSet {
    entries: Vec<Nonce>,
}

impl NonceSet {
    /// Draw `count` nonce pairs uniformly from `[0, 2^exponent)`.
    pub fn generate(rng: &mut impl CryptoRng, count: usize, exponent: u32) -> Self {
        let mask = if exponent >= 32 {
            u32::MAX
        } else {
            ((1u64 << exponent) - 1) as u32
        };
        let entries = (0..count)
            .map(|_| Nonce {
                first: rng.next_u32() & mask,
                second: rng.next_u32() & mask,
            })
            .collect();
        Self { entries }
    }

    /// Wrap explicit nonce pairs.
    #[must_use]
    pub fn from_entries(entries: Vec<Nonce>) -> Self {
        Self { entries }
    }

    /// Nonce pair of a leaf.
    pub fn get(&self, leaf: u32) -> Option<Nonce> {
        self.entries.get(leaf as usize).copied()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All pairs in leaf order.
    pub fn entries(&self) -> &[Nonce] {
        &self.entries
    }
}

/// Borrowed key material needed to derive one-time keys.
#[derive(Clone, Copy, Debug)]
pub struct SeedView<'a> {
    /// Public seed.
    pub public_seed: &'a [u8],
    /// Secret seed.
    pub secret_seed: &'a [u8],
    /// Nonce table.
    pub nonces: &'a NonceSet,
}

/// Verification key. Equality is constant-time.
#[derive(Clone, Debug)]
pub struct PublicKey {
    pub(crate) root: Vec<u8>,
    pub(crate) backup_root: Option<Vec<u8>>,
    pub(crate) public_seed: Vec<u8>,
}

impl ConstantTimeEq for PublicKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        let backup = match (&self.backup_root, &other.backup_root) {
            (Some(ours), Some(theirs)) => ours.as_slice().ct_eq(theirs.as_slice()),
            (None, None) => Choice::from(1u8),
            _ => Choice::from(0u8),
        };
        self.root.as_slice().ct_eq(other.root.as_slice())
            & self.public_seed.as_slice().ct_eq(other.public_seed.as_slice())
            & backup
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for PublicKey {}

impl PublicKey {
    /// Assemble a public key from its parts.
    #[must_use]
    pub fn new(root: Vec<u8>, backup_root: Option<Vec<u8>>, public_seed: Vec<u8>) -> Self {
        Self {
            root,
            backup_root,
            public_seed,
        }
    }

    /// Root under the primary digest.
    pub fn root(&self) -> &[u8] {
        &self.root
    }

    /// Root under the backup digest, if one was configured.
    pub fn backup_root(&self) -> Option<&[u8]> {
        self.backup_root.as_deref()
    }

    /// Public seed.
    pub fn public_seed(&self) -> &[u8] {
        &self.public_seed
    }
}

/// Tag identifying the key a reservation came from.
type KeyTag = [u8; 16];

/// An index taken from a private key but not yet released for signing.
///
/// Persist the private key, then [`commit`](Self::commit).
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reserved index is lost unless it is committed and signed"]
pub struct IndexReservation {
    index: u64,
    key: KeyTag,
}

impl IndexReservation {
    /// Reserved index.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Confirm that the advanced key has been persisted.
    pub fn commit(self) -> CommittedIndex {
        CommittedIndex {
            index: self.index,
            key: self.key,
        }
    }
}

/// An index whose advance has been persisted. Consumed by signing.
#[derive(Debug, PartialEq, Eq)]
pub struct CommittedIndex {
    index: u64,
    key: KeyTag,
}

impl CommittedIndex {
    /// Committed index.
    pub fn index(&self) -> u64 {
        self.index
    }
}

/// Signing key: header, secret material, signing index, nonces and the
/// node caches of every layer tree in use.
pub struct PrivateKey {
    pub(crate) height: u32,
    pub(crate) layers: u32,
    pub(crate) hash: HashType,
    pub(crate) backup_hash: Option<HashType>,
    pub(crate) nonce_exponent: u32,
    pub(crate) index: u64,
    pub(crate) public_seed: Vec<u8>,
    pub(crate) secret_seed: Zeroizing<Vec<u8>>,
    pub(crate) secret_prf: Zeroizing<Vec<u8>>,
    pub(crate) root: Vec<u8>,
    pub(crate) backup_root: Option<Vec<u8>>,
    pub(crate) nonces: NonceSet,
    pub(crate) cache: CacheSet,
}

impl PrivateKey {
    /// Total height `h`.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of layers `d`.
    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Height of each layer tree.
    pub fn tree_height(&self) -> u32 {
        self.height / self.layers
    }

    /// Primary digest.
    pub fn hash(&self) -> HashType {
        self.hash
    }

    /// Backup digest, if any.
    pub fn backup_hash(&self) -> Option<HashType> {
        self.backup_hash
    }

    /// Nonce exponent the nonce table was drawn with.
    pub fn nonce_exponent(&self) -> u32 {
        self.nonce_exponent
    }

    /// Next index to be reserved.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Total signatures, `2^h`.
    pub fn max_signatures(&self) -> u64 {
        1u64 << self.height
    }

    /// Signatures still available.
    pub fn remaining(&self) -> u64 {
        self.max_signatures().saturating_sub(self.index)
    }

    /// Root under the primary digest.
    pub fn root(&self) -> &[u8] {
        &self.root
    }

    /// Nonce table.
    pub fn nonces(&self) -> &NonceSet {
        &self.nonces
    }

    /// Node caches.
    pub fn cache(&self) -> &CacheSet {
        &self.cache
    }

    /// Matching verification key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            root: self.root.clone(),
            backup_root: self.backup_root.clone(),
            public_seed: self.public_seed.clone(),
        }
    }

    /// Seeds for one-time key derivation, together with the node caches.
    pub(crate) fn split_mut(&mut self) -> (SeedView<'_>, &mut CacheSet) {
        (
            SeedView {
                public_seed: &self.public_seed,
                secret_seed: &self.secret_seed,
                nonces: &self.nonces,
            },
            &mut self.cache,
        )
    }

    fn tag(&self) -> KeyTag {
        let mut tag = [0u8; 16];
        for (dst, src) in tag[..8].iter_mut().zip(&self.root) {
            *dst = *src;
        }
        for (dst, src) in tag[8..].iter_mut().zip(&self.public_seed) {
            *dst = *src;
        }
        tag
    }

    /// Take the next index and advance the key.
    ///
    /// The caller must persist the advanced key before committing the
    /// reservation.
    pub fn reserve_next_index(&mut self) -> Result<IndexReservation> {
        let max = self.max_signatures();
        if self.index >= max {
            return Err(Error::KeysExhausted { max });
        }
        let index = self.index;
        self.index += 1;

        let remaining = self.remaining();
        if remaining < 16 || remaining < max / 16 {
            warn!(remaining, max, "private key is nearly exhausted");
        }

        Ok(IndexReservation {
            index,
            key: self.tag(),
        })
    }

    /// Reject a committed index this key did not hand out.
    pub(crate) fn check_committed(&self, committed: &CommittedIndex) -> Result<()> {
        let ours: bool = self.tag().ct_eq(&committed.key).into();
        if !ours || committed.index >= self.index {
            return Err(Error::ForeignReservation);
        }
        Ok(())
    }
}

impl core::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("height", &self.height)
            .field("layers", &self.layers)
            .field("hash", &self.hash)
            .field("backup_hash", &self.backup_hash)
            .field("index", &self.index)
            .field("root", &hex::encode(&self.root))
            .field("cached_nodes", &self.cache.node_count())
            .finish_non_exhaustive()
    }
}
