//! XMSS and XMSS^MT stateful hash-based signatures
//!
//! This crate provides a pure Rust implementation of the eXtended Merkle
//! Signature Scheme in its single-tree and multi-tree forms. Security rests
//! only on the underlying hash function, which makes the scheme a
//! post-quantum signature primitive.
//!
//! Unlike stateless schemes, every private key carries a signing index that
//! must never be reused. See [`keys`] for the two-phase reserve / commit
//! contract that makes persistence safe.
//!
//! # Supported digests
//!
//! | Hash | n | Code |
//! |------|---|------|
//! | SHA-256 | 32 | 1 |
//! | SHA3-256 | 32 | 2 |
//! | SHAKE256 | 32 | 3 |
//! | SHA-512 | 64 | 4 |
//!
//! A key may carry a backup digest of the same output size with its own
//! root, so signing can switch digests if the primary one is broken.
//!
//! # Architecture
//!
//! - **WOTS+**: Winternitz one-time signatures with per-leaf nonces
//! - **L-tree**: compresses a one-time public key into a tree leaf
//! - **Tree hashing**: Merkle roots and authentication paths, served from a
//!   per-tree node cache
//! - **XMSS^MT**: layers of trees where each tree signs the root below it
//!
//! # Example
//!
//! ```rust
//! use quill_xmss::{Params, XmssMt};
//! use rand::SeedableRng;
//!
//! let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(7);
//! let engine = XmssMt::new(Params::new(4, 2)).unwrap();
//! let (mut sk, pk) = engine.generate_keys(&mut rng).unwrap();
//!
//! let message = b"Hello, post-quantum world!";
//! let signature = engine.sign(&mut sk, message).unwrap();
//!
//! assert!(engine.verify(&signature, message, &pk));
//! assert_eq!(sk.remaining(), 15);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
// Clippy allowances for cryptographic code patterns
#![allow(
    clippy::many_single_char_names,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::doc_markdown,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::items_after_statements,
    clippy::needless_range_loop
)]

// Core modules
mod address;
/// Authentication-path node cache.
pub mod cache;
/// Execution context: digest pools and worker threads.
pub mod context;
/// Digest selection.
pub mod hash;
/// Key types and the stateful index contract.
pub mod keys;
/// Engine parameters.
pub mod params;
mod primitives;
mod utils;

// Building blocks
mod ltree;
mod parallel;
mod treehash;
mod wots;

// Engines
/// Single-tree engine.
pub mod xmss;
/// Multi-tree engine.
pub mod xmss_mt;

// Serialization
/// Binary encodings.
pub mod encoding;
/// Armoured text export.
pub mod export;

// Public exports
pub use cache::{CacheSet, NodeCache};
pub use context::Context;
pub use encoding::{VERSION_MAJOR, VERSION_MINOR};
pub use export::{export_private_key, import_private_key};
pub use hash::HashType;
pub use keys::{CommittedIndex, IndexReservation, Nonce, NonceSet, PrivateKey, PublicKey};
pub use params::{CachePolicy, Params, ThreadMode};
pub use xmss::{TreeSignature, Xmss};
pub use xmss_mt::{DigestSelector, MultiTreeSignature, XmssMt};

// Re-export core types
pub use quill_core::{Error, Result, StatefulSigner};
