//! Digest selection.
//!
//! Every key records which digest built its trees (and optionally a backup
//! digest). The engine picks the digest at runtime from that code, so the
//! hash is an enum rather than a type parameter.
//!
//! | Code | Digest | n |
//! |------|--------|---|
//! | 1 | SHA-256 | 32 |
//! | 2 | SHA3-256 | 32 |
//! | 3 | SHAKE256 (256-bit output) | 32 |
//! | 4 | SHA-512 | 64 |

use quill_core::{Error, Result};
use sha2::digest::{Digest, ExtendableOutputReset, Reset, Update, XofReader};
use sha2::{Sha256, Sha512};
use sha3::{Sha3_256, Shake256};

/// Underlying digest of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HashType {
    /// SHA-256, n = 32.
    #[cfg_attr(feature = "serde", serde(rename = "sha2-256"))]
    Sha2_256,
    /// SHA3-256, n = 32.
    #[cfg_attr(feature = "serde", serde(rename = "sha3-256"))]
    Sha3_256,
    /// SHAKE256 squeezed to 32 bytes.
    #[cfg_attr(feature = "serde", serde(rename = "shake256"))]
    Shake256,
    /// SHA-512, n = 64.
    #[cfg_attr(feature = "serde", serde(rename = "sha2-512"))]
    Sha2_512,
}

impl HashType {
    /// Output size `n` in bytes.
    #[must_use]
    pub const fn output_size(self) -> usize {
        match self {
            HashType::Sha2_256 | HashType::Sha3_256 | HashType::Shake256 => 32,
            HashType::Sha2_512 => 64,
        }
    }

    /// Code stored in key headers.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            HashType::Sha2_256 => 1,
            HashType::Sha3_256 => 2,
            HashType::Shake256 => 3,
            HashType::Sha2_512 => 4,
        }
    }

    /// Parse a header code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(HashType::Sha2_256),
            2 => Ok(HashType::Sha3_256),
            3 => Ok(HashType::Shake256),
            4 => Ok(HashType::Sha2_512),
            other => Err(Error::UnsupportedHash(other)),
        }
    }

    /// Encode an optional backup digest (0 = none).
    #[must_use]
    pub const fn optional_code(hash: Option<HashType>) -> u8 {
        match hash {
            Some(h) => h.code(),
            None => 0,
        }
    }

    /// Decode an optional backup digest (0 = none).
    pub fn from_optional_code(code: u8) -> Result<Option<Self>> {
        if code == 0 {
            Ok(None)
        } else {
            Self::from_code(code).map(Some)
        }
    }

    /// Short lowercase name used by the text export and the CLI.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            HashType::Sha2_256 => "sha2-256",
            HashType::Sha3_256 => "sha3-256",
            HashType::Shake256 => "shake256",
            HashType::Sha2_512 => "sha2-512",
        }
    }

    /// Parse a name produced by [`HashType::name`].
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "sha2-256" => Ok(HashType::Sha2_256),
            "sha3-256" => Ok(HashType::Sha3_256),
            "shake256" => Ok(HashType::Shake256),
            "sha2-512" => Ok(HashType::Sha2_512),
            _ => Err(Error::Encoding("unknown hash name")),
        }
    }

    /// Fresh digest instance.
    #[must_use]
    pub fn hasher(self) -> Hasher {
        match self {
            HashType::Sha2_256 => Hasher::Sha2_256(Sha256::new()),
            HashType::Sha3_256 => Hasher::Sha3_256(Sha3_256::new()),
            HashType::Shake256 => Hasher::Shake256(Shake256::default()),
            HashType::Sha2_512 => Hasher::Sha2_512(Sha512::new()),
        }
    }
}

impl core::fmt::Display for HashType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A streaming digest instance. Instances are recycled through the context
/// pool, so finalization always leaves the state reset.
#[derive(Clone)]
pub enum Hasher {
    /// SHA-256 state.
    Sha2_256(Sha256),
    /// SHA3-256 state.
    Sha3_256(Sha3_256),
    /// SHAKE256 state.
    Shake256(Shake256),
    /// SHA-512 state.
    Sha2_512(Sha512),
}

impl Hasher {
    /// Absorb `data`.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha2_256(h) => Update::update(h, data),
            Hasher::Sha3_256(h) => Update::update(h, data),
            Hasher::Shake256(h) => Update::update(h, data),
            Hasher::Sha2_512(h) => Update::update(h, data),
        }
    }

    /// Write the digest into `out` and reset the state.
    ///
    /// `out` must be exactly the output size of the digest.
    #[inline]
    pub fn finalize_reset_into(&mut self, out: &mut [u8]) {
        match self {
            Hasher::Sha2_256(h) => out.copy_from_slice(&Digest::finalize_reset(h)),
            Hasher::Sha3_256(h) => out.copy_from_slice(&Digest::finalize_reset(h)),
            Hasher::Shake256(h) => h.finalize_xof_reset().read(out),
            Hasher::Sha2_512(h) => out.copy_from_slice(&Digest::finalize_reset(h)),
        }
    }

    /// Drop any absorbed input.
    #[inline]
    pub fn reset(&mut self) {
        match self {
            Hasher::Sha2_256(h) => Reset::reset(h),
            Hasher::Sha3_256(h) => Reset::reset(h),
            Hasher::Shake256(h) => Reset::reset(h),
            Hasher::Sha2_512(h) => Reset::reset(h),
        }
    }
}

/// One-shot SHA-256, used for text-export checksums independent of the key's
/// digest.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}
