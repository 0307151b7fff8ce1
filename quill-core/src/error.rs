//! Error types for Quill signature operations.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while constructing an engine, encoding or decoding
/// keys and signatures, or signing.
///
/// A failed verification is not an error: verification returns `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A parameter is outside its supported range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Unknown hash type code.
    #[error("unsupported hash type code {0:#04x}")]
    UnsupportedHash(u8),

    /// A key was produced under different parameters than the engine using it.
    #[error("key does not match engine parameters: {0}")]
    ParameterMismatch(&'static str),

    /// The worker pool for the configured thread mode could not be built.
    #[error("failed to build worker pool")]
    ThreadPool,

    /// Unsupported encoding version.
    #[error("unsupported version {major}.{minor} (expected {expected}.x)")]
    VersionMismatch {
        /// Supported major version.
        expected: u8,
        /// Major version found in the input.
        major: u8,
        /// Minor version found in the input.
        minor: u8,
    },

    /// A fixed-size field has the wrong length.
    #[error("invalid {field} length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Field being decoded.
        field: &'static str,
        /// Expected length in bytes.
        expected: usize,
        /// Actual length provided.
        actual: usize,
    },

    /// The input ended before a field was complete.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),

    /// Malformed encoding.
    #[error("encoding error: {0}")]
    Encoding(&'static str),

    /// The checksum of a text export does not match its body.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Every one-time key of the private key has been used.
    #[error("keys exhausted: all {max} signatures used")]
    KeysExhausted {
        /// Total number of signatures the key supports.
        max: u64,
    },

    /// Seed or key material is missing or has the wrong size.
    #[error("missing key material: {0}")]
    MissingKeyMaterial(&'static str),

    /// A committed index was presented to a key that did not reserve it.
    #[error("index reservation belongs to a different key")]
    ForeignReservation,
}
