//! Typed key objects.
//!
//! Wrappers for the four asymmetric roles: signing public/private (Ed25519)
//! and key-agreement public/private (X25519). Public keys compare and hash by
//! their 32-byte raw representation so they can index maps; private keys are
//! zeroized on drop by the underlying dalek types.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{SharedSecret, StaticSecret};

use crate::error::CryptoError;

/// Raw length of every asymmetric key in the protocol.
pub const KEY_LEN: usize = 32;

/// Ed25519 signature, re-exported so downstream crates don't need a direct
/// dalek dependency.
pub type Signature = ed25519_dalek::Signature;

/// Public half of an Ed25519 signing key pair.
///
/// Byte equality; usable as a map key. Point validity is checked lazily at
/// verification time so untrusted 32-byte blobs can be carried around before
/// they are ever trusted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningPublicKey([u8; KEY_LEN]);

impl SigningPublicKey {
    /// Wrap raw key bytes without validation.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a byte slice, checking only the length.
    ///
    /// # Errors
    ///
    /// `InvalidKeySize` if `bytes` is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySize { expected: KEY_LEN, actual: bytes.len() })?;
        Ok(Self(raw))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Check that the bytes decode to a valid curve point.
    pub fn is_valid(&self) -> bool {
        VerifyingKey::from_bytes(&self.0).is_ok()
    }

    /// Verify `signature` over `message`.
    ///
    /// # Errors
    ///
    /// - `CryptoFailure` if the key bytes are not a valid curve point
    /// - `BadSignature` if the signature does not verify
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::CryptoFailure)?;
        key.verify(message, signature).map_err(|_| CryptoError::BadSignature)
    }
}

impl std::fmt::Debug for SigningPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningPublicKey({})", hex_prefix(&self.0))
    }
}

/// Private half of an Ed25519 signing key pair.
#[derive(Clone)]
pub struct SigningPrivateKey(SigningKey);

impl SigningPrivateKey {
    /// Generate a fresh signing key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(SigningKey::generate(rng))
    }

    /// Restore from the 32-byte secret scalar.
    pub fn from_bytes(bytes: &[u8; KEY_LEN]) -> Self {
        Self(SigningKey::from_bytes(bytes))
    }

    /// Secret scalar bytes. Callers own the copy and should zeroize it.
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    /// The matching public key.
    pub fn public(&self) -> SigningPublicKey {
        SigningPublicKey(self.0.verifying_key().to_bytes())
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.0.sign(message)
    }
}

impl PartialEq for SigningPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes() == other.0.to_bytes()
    }
}

impl Eq for SigningPrivateKey {}

impl std::fmt::Debug for SigningPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material.
        write!(f, "SigningPrivateKey(pub {})", hex_prefix(self.public().as_bytes()))
    }
}

impl Serialize for SigningPrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SigningPrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; KEY_LEN]>::deserialize(deserializer)?;
        Ok(Self(SigningKey::from_bytes(&bytes)))
    }
}

/// Public half of an X25519 key-agreement pair.
///
/// Every 32-byte string is a valid X25519 public key, so construction never
/// fails beyond the length check.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgreementPublicKey([u8; KEY_LEN]);

impl AgreementPublicKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Wrap a byte slice, checking the length.
    ///
    /// # Errors
    ///
    /// `InvalidKeySize` if `bytes` is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySize { expected: KEY_LEN, actual: bytes.len() })?;
        Ok(Self(raw))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn to_x25519(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl std::fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementPublicKey({})", hex_prefix(&self.0))
    }
}

/// Private half of an X25519 key-agreement pair.
#[derive(Clone)]
pub struct AgreementPrivateKey(StaticSecret);

impl AgreementPrivateKey {
    /// Generate a fresh agreement key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(StaticSecret::random_from_rng(rng))
    }

    /// Restore from the 32-byte secret scalar (clamped by the curve impl).
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Secret scalar bytes. Callers own the copy and should zeroize it.
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    /// The matching public key.
    pub fn public(&self) -> AgreementPublicKey {
        AgreementPublicKey(x25519_dalek::PublicKey::from(&self.0).to_bytes())
    }

    pub(crate) fn agree(&self, peer: &AgreementPublicKey) -> SharedSecret {
        self.0.diffie_hellman(&peer.to_x25519())
    }
}

impl PartialEq for AgreementPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes() == other.0.to_bytes()
    }
}

impl Eq for AgreementPrivateKey {}

impl std::fmt::Debug for AgreementPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementPrivateKey(pub {})", hex_prefix(self.public().as_bytes()))
    }
}

impl Serialize for AgreementPrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.to_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AgreementPrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <[u8; KEY_LEN]>::deserialize(deserializer)?;
        Ok(Self(StaticSecret::from(bytes)))
    }
}

fn hex_prefix(bytes: &[u8; KEY_LEN]) -> String {
    bytes[..4].iter().map(|b| format!("{b:02x}")).collect()
}
