//! Crypto error types.

use thiserror::Error;

/// Errors from cryptographic operations.
///
/// These are deliberately coarse: a GCM tag mismatch and a bad key agreement
/// are indistinguishable to callers, and finer detail would only help an
/// attacker probing the decryption path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key or ciphertext input shorter than the required length.
    #[error("invalid key size: need at least {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Required minimum length in bytes.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Key agreement, AEAD open, or key construction failed.
    #[error("cryptographic operation failed")]
    CryptoFailure,

    /// A signature did not verify under the given public key.
    #[error("signature verification failed")]
    BadSignature,
}
