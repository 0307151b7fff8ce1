//! Stateful signature trait.

use crate::Result;
use rand_core::CryptoRng;

/// Stateful digital signature scheme.
///
/// Unlike a stateless scheme, signing mutates the signing key: every
/// signature consumes one index that must never be used again. Callers that
/// persist keys must store the advanced key before releasing the signature.
///
/// # Example
///
/// ```ignore
/// use quill_core::StatefulSigner;
///
/// let (mut sk, pk) = engine.generate_keys(&mut rng)?;
/// let sig = engine.sign(&mut sk, message)?;
/// assert!(engine.verify(&sig, message, &pk)?);
/// ```
pub trait StatefulSigner {
    /// Signing (private) key. Carries the signing index.
    type SigningKey;

    /// Verification (public) key.
    type VerificationKey: Clone;

    /// Generate a new key pair.
    ///
    /// # Arguments
    ///
    /// * `rng` - A cryptographically secure random number generator.
    fn generate_keys(
        &self,
        rng: &mut impl CryptoRng,
    ) -> Result<(Self::SigningKey, Self::VerificationKey)>;

    /// Sign a message with the next unused index, advancing the key.
    ///
    /// # Returns
    ///
    /// The encoded signature.
    fn sign(&self, sk: &mut Self::SigningKey, message: &[u8]) -> Result<Vec<u8>>;

    /// Verify an encoded signature against an encoded public key.
    ///
    /// # Returns
    ///
    /// `Ok(false)` for a well-formed signature that does not verify; `Err` only
    /// when the input cannot be parsed at all.
    fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> Result<bool>;

    /// Number of signatures still available from `sk`.
    fn remaining(&self, sk: &Self::SigningKey) -> u64;
}
