//! Binary encodings of keys and signatures.
//!
//! Integers that can grow with the tree (indices, counts, lengths) are
//! unsigned LEB128 varints; nonces are big-endian `u32`s; everything else
//! is a single byte or a fixed `n`-byte string.
//!
//! # Private key
//!
//! ```text
//! major u8 | minor u8
//! varint index | u8 height | u8 layers | varint leaf_count
//! u8 hash | u8 backup_hash | u8 nonce_exponent | public_seed[n]
//! varint len | secret_seed | varint len | secret_prf
//! root[n] | backup_root[n]
//! varint cache_count | { u8 layer | varint tree | varint node_count
//!                        | { u8 height | varint index | node[n] } }
//! nonce[leaf_count] = { u32 first | u32 second }
//! ```
//!
//! # Public key
//!
//! `root[n] || backup_root[n] || public_seed[n]`, with an all-zero backup
//! root when no backup digest is configured.
//!
//! # Signature
//!
//! ```text
//! u8 type | u8 version | varint index | r[n] | u8 count
//! { u8 layer | varint body_len | r[n] | varint leaf | ots | auth[h'·n] }
//! ```

use crate::cache::{CacheSet, NodeCache};
use crate::hash::HashType;
use crate::keys::{Nonce, NonceSet, PrivateKey, PublicKey};
use crate::params::{leaf_index, varint_len, Params};
use crate::xmss::TreeSignature;
use crate::xmss_mt::{DigestSelector, MultiTreeSignature};
use quill_core::{Error, Result, Zeroizing};

/// Major version of every binary encoding.
pub const VERSION_MAJOR: u8 = 1;

/// Minor version written by this implementation.
pub const VERSION_MINOR: u8 = 0;

/// Longest LEB128 encoding of a `u64`.
const MAX_VARINT_BYTES: usize = 10;

struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32_be(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn prefixed(&mut self, bytes: &[u8]) {
        self.varint(bytes.len() as u64);
        self.bytes(bytes);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Truncated(field));
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn u32_be(&mut self, field: &'static str) -> Result<u32> {
        let bytes = self.take(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn varint(&mut self, field: &'static str) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.u8(field)?;
            let bits = u64::from(byte & 0x7f);
            let shift = 7 * i as u32;
            if shift == 63 && bits > 1 {
                return Err(Error::Encoding("varint overflows u64"));
            }
            value |= bits << shift;
            if byte & 0x80 == 0 {
                // Encodings are canonical: no zero-valued final group.
                if byte == 0 && i > 0 {
                    return Err(Error::Encoding("non-minimal varint"));
                }
                return Ok(value);
            }
        }
        Err(Error::Encoding("varint longer than 10 bytes"))
    }

    /// Varint that must fit `usize` and be at most `max`.
    fn bounded(&mut self, field: &'static str, max: u64) -> Result<usize> {
        let value = self.varint(field)?;
        if value > max {
            return Err(Error::Encoding(field));
        }
        usize::try_from(value).map_err(|_| Error::Encoding(field))
    }

    fn fixed(&mut self, len: usize, field: &'static str) -> Result<&'a [u8]> {
        self.take(len, field)
    }

    fn prefixed(&mut self, expected: usize, field: &'static str) -> Result<&'a [u8]> {
        let len = self.varint(field)?;
        if len != expected as u64 {
            return Err(Error::InvalidLength {
                field,
                expected,
                actual: usize::try_from(len).unwrap_or(usize::MAX),
            });
        }
        self.take(expected, field)
    }

    fn finish(self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::Encoding("trailing bytes"));
        }
        Ok(())
    }
}

fn check_version(major: u8, minor: u8) -> Result<()> {
    if major != VERSION_MAJOR {
        return Err(Error::VersionMismatch {
            expected: VERSION_MAJOR,
            major,
            minor,
        });
    }
    Ok(())
}

impl PrivateKey {
    /// Serialize the key, its node caches and its nonce table.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let n = self.hash.output_size();
        let mut w = ByteWriter::with_capacity(
            64 + 6 * n + self.nonces.len() * 8 + self.cache.node_count() * (n + 4),
        );

        w.u8(VERSION_MAJOR);
        w.u8(VERSION_MINOR);
        w.varint(self.index);
        w.u8(self.height as u8);
        w.u8(self.layers as u8);
        w.varint(self.nonces.len() as u64);
        w.u8(self.hash.code());
        w.u8(HashType::optional_code(self.backup_hash));
        w.u8(self.nonce_exponent as u8);
        w.bytes(&self.public_seed);
        w.prefixed(&self.secret_seed);
        w.prefixed(&self.secret_prf);
        w.bytes(&self.root);
        match &self.backup_root {
            Some(root) => w.bytes(root),
            None => w.bytes(&vec![0u8; n]),
        }

        w.varint(self.cache.tree_count() as u64);
        for (&(layer, tree), cache) in self.cache.iter() {
            let entries = cache.entries();
            w.u8(layer as u8);
            w.varint(tree);
            w.varint(entries.len() as u64);
            for ((height, index), node) in entries {
                w.u8(height as u8);
                w.varint(u64::from(index));
                w.bytes(&node);
            }
        }

        for nonce in self.nonces.entries() {
            w.u32_be(nonce.first);
            w.u32_be(nonce.second);
        }

        Zeroizing::new(w.into_inner())
    }

    /// Parse a key written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        let major = r.u8("version")?;
        let minor = r.u8("version")?;
        check_version(major, minor)?;

        let index = r.varint("index")?;
        let height = u32::from(r.u8("height")?);
        let layers = u32::from(r.u8("layers")?);
        let leaf_count = r.varint("leaf count")?;
        let hash = HashType::from_code(r.u8("hash type")?)?;
        let backup_hash = HashType::from_optional_code(r.u8("backup hash type")?)?;
        let nonce_exponent = u32::from(r.u8("nonce exponent")?);

        let params = Params::new(height, layers)
            .with_hash(hash)
            .with_backup_hash(backup_hash)
            .with_nonce_exponent(nonce_exponent);
        params.validate()?;
        let n = params.n();
        let tree_height = params.tree_height();

        if leaf_count != params.leaves_per_tree() {
            return Err(Error::Encoding("leaf count does not match tree height"));
        }
        if index > params.max_signatures() {
            return Err(Error::Encoding("index beyond the last signature"));
        }

        let public_seed = r.fixed(n, "public seed")?.to_vec();
        let secret_seed = Zeroizing::new(r.prefixed(n, "secret seed")?.to_vec());
        let secret_prf = Zeroizing::new(r.prefixed(n, "secret prf")?.to_vec());
        let root = r.fixed(n, "root")?.to_vec();
        let backup_root = r.fixed(n, "backup root")?;
        let backup_root = match backup_hash {
            Some(_) => Some(backup_root.to_vec()),
            None if backup_root.iter().all(|&b| b == 0) => None,
            None => return Err(Error::Encoding("backup root without backup hash")),
        };

        let mut cache = CacheSet::new();
        let cache_count = r.varint("cache count")?;
        for _ in 0..cache_count {
            let layer = u32::from(r.u8("cache layer")?);
            if layer >= layers {
                return Err(Error::Encoding("cache layer out of range"));
            }
            let tree = r.varint("cache tree")?;
            let trees_in_layer_bits = height - (layer + 1) * tree_height;
            if trees_in_layer_bits < 64 && tree >= 1u64 << trees_in_layer_bits {
                return Err(Error::Encoding("cache tree out of range"));
            }
            if cache.tree(layer, tree).is_some() {
                return Err(Error::Encoding("duplicate tree cache"));
            }

            let cursor = u64::from(leaf_index(index, layer, tree_height));
            let mut nodes = NodeCache::new(cursor);
            let node_count = r.varint("node count")?;
            for _ in 0..node_count {
                let node_height = u32::from(r.u8("node height")?);
                if node_height > tree_height {
                    return Err(Error::Encoding("node height out of range"));
                }
                let max_index = (1u64 << (tree_height - node_height)) - 1;
                let node_index = r.bounded("node index", max_index)? as u32;
                nodes.insert(node_height, node_index, r.fixed(n, "cached node")?.to_vec());
            }
            cache.insert_tree(layer, tree, nodes);
        }

        // leaf_count is at most 2^20 here, so the table length cannot overflow.
        let table = r.fixed(leaf_count as usize * 8, "nonce table")?;
        let entries = table
            .chunks_exact(8)
            .map(|pair| Nonce {
                first: u32::from_be_bytes([pair[0], pair[1], pair[2], pair[3]]),
                second: u32::from_be_bytes([pair[4], pair[5], pair[6], pair[7]]),
            })
            .collect();
        r.finish()?;

        Ok(PrivateKey {
            height,
            layers,
            hash,
            backup_hash,
            nonce_exponent,
            index,
            public_seed,
            secret_seed,
            secret_prf,
            root,
            backup_root,
            nonces: NonceSet::from_entries(entries),
            cache,
        })
    }
}

impl PublicKey {
    /// `root || backup_root || public_seed`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let n = self.root.len();
        let mut out = Vec::with_capacity(3 * n);
        out.extend_from_slice(&self.root);
        match &self.backup_root {
            Some(root) => out.extend_from_slice(root),
            None => out.resize(2 * n, 0),
        }
        out.extend_from_slice(&self.public_seed);
        out
    }

    /// Parse a public key for digest `hash`.
    pub fn from_bytes(bytes: &[u8], hash: HashType) -> Result<Self> {
        let n = hash.output_size();
        if bytes.len() != 3 * n {
            return Err(Error::InvalidLength {
                field: "public key",
                expected: 3 * n,
                actual: bytes.len(),
            });
        }
        let (root, rest) = bytes.split_at(n);
        let (backup_root, public_seed) = rest.split_at(n);
        let backup_root = if backup_root.iter().all(|&b| b == 0) {
            None
        } else {
            Some(backup_root.to_vec())
        };
        Ok(PublicKey::new(root.to_vec(), backup_root, public_seed.to_vec()))
    }
}

impl MultiTreeSignature {
    /// Serialize the signature.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = |layer: &TreeSignature| {
            layer.r.len() + varint_len(u64::from(layer.leaf)) + layer.ots.len() + layer.auth.len()
        };
        let capacity = 16
            + self.r.len()
            + self.layers.iter().map(|l| 12 + body_len(l)).sum::<usize>();

        let mut w = ByteWriter::with_capacity(capacity);
        w.u8(self.selector.code());
        w.u8(VERSION_MAJOR);
        w.varint(self.index);
        w.bytes(&self.r);
        w.u8(self.layers.len() as u8);
        for layer in &self.layers {
            w.u8(layer.layer as u8);
            w.varint(body_len(layer) as u64);
            w.bytes(&layer.r);
            w.varint(u64::from(layer.leaf));
            w.bytes(&layer.ots);
            w.bytes(&layer.auth);
        }
        w.into_inner()
    }

    /// Parse a signature for digest size `n` and layer tree height
    /// `tree_height`.
    ///
    /// Only framing is checked here; whether the signature fits the engine's
    /// parameters is decided by verification.
    pub fn from_bytes(bytes: &[u8], n: usize, tree_height: u32) -> Result<Self> {
        let auth_len = tree_height as usize * n;
        let mut r = ByteReader::new(bytes);

        let selector = DigestSelector::from_code(r.u8("signature type")?)?;
        let version = r.u8("signature version")?;
        check_version(version, 0)?;
        let index = r.varint("signature index")?;
        let randomizer = r.fixed(n, "randomizer")?.to_vec();
        let count = r.u8("layer count")?;

        let mut layers = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let layer = u32::from(r.u8("layer")?);
            let body_len = r.bounded("layer body length", bytes.len() as u64)?;
            let mut body = ByteReader::new(r.take(body_len, "layer body")?);

            let layer_r = body.fixed(n, "layer randomizer")?.to_vec();
            let leaf = body.bounded("leaf", u64::from(u32::MAX))? as u32;
            if body.remaining() < auth_len {
                return Err(Error::Truncated("authentication path"));
            }
            let ots = body.take(body.remaining() - auth_len, "one-time signature")?.to_vec();
            let auth = body.take(auth_len, "authentication path")?.to_vec();
            body.finish()?;

            layers.push(TreeSignature {
                layer,
                r: layer_r,
                leaf,
                ots,
                auth,
            });
        }
        r.finish()?;

        Ok(MultiTreeSignature {
            selector,
            index,
            r: randomizer,
            layers,
        })
    }
}
