//! # Quill Core
//!
//! Core traits and utilities shared by the Quill hash-based signature crates.
//!
//! This crate provides:
//! - The error taxonomy used by every engine operation
//! - The [`StatefulSigner`] trait
//! - Safe word-wise XOR used for tweakable-hash bitmasks
//! - Re-exports of `zeroize` and `subtle` for secret handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod traits;
mod xor;

pub use error::{Error, Result};
pub use traits::StatefulSigner;
pub use xor::{xor_in_place, xor_into};

/// Re-export zeroize for convenience.
pub use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Re-export subtle for constant-time operations.
pub use subtle;
