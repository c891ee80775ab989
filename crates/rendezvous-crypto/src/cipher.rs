//! Cipher façade: asymmetric encrypt-to-public, AES-256-GCM sealing, hashing.
//!
//! Asymmetric encryption composes ephemeral X25519 ECDH, HKDF-SHA256 with a
//! fixed protocol salt, and AES-256-GCM. The HKDF info parameter binds the
//! session key to both the ephemeral and the recipient public key, so a blob
//! re-targeted at another recipient fails to open.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    keys::{AgreementPrivateKey, AgreementPublicKey, KEY_LEN},
};

/// HKDF salt fixed by the protocol.
pub const HKDF_SALT: &[u8] = b"RendezvousClient";

/// AES-GCM nonce length (also the length of message and file ids).
pub const GCM_NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const GCM_TAG_LEN: usize = 16;

/// Symmetric AES-256-GCM key, zeroized on drop.
#[derive(Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageKey([u8; KEY_LEN]);

impl MessageKey {
    /// Generate a fresh random key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut key = [0u8; KEY_LEN];
        rng.fill_bytes(&mut key);
        Self(key)
    }

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
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageKey(..)")
    }
}

/// A file sealed under a topic message key with a caller-chosen nonce.
///
/// The ciphertext excludes the tag; the tag travels in the file descriptor
/// while the ciphertext is stored server-side, addressed by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFile {
    /// Ciphertext without the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Detached GCM authentication tag.
    pub tag: [u8; GCM_TAG_LEN],
}

/// Encrypt `plaintext` to a recipient's agreement public key.
///
/// Output layout: `ephemeral_pub (32) || nonce (12) || ciphertext || tag (16)`.
pub fn encrypt_to<R: RngCore + CryptoRng>(
    recipient: &AgreementPublicKey,
    plaintext: &[u8],
    rng: &mut R,
) -> Vec<u8> {
    let ephemeral = AgreementPrivateKey::generate(rng);
    let ephemeral_pub = ephemeral.public();

    let key = derive_session_key(ephemeral.agree(recipient).as_bytes(), &ephemeral_pub, recipient);
    let combined = seal(&key, plaintext, rng);

    let mut out = Vec::with_capacity(KEY_LEN + combined.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&combined);
    out
}

/// Decrypt a blob produced by [`encrypt_to`] with the recipient's private key.
///
/// # Errors
///
/// - `InvalidKeySize` if `blob` is shorter than an ephemeral public key
/// - `CryptoFailure` if the GCM tag does not verify
pub fn decrypt_from(secret: &AgreementPrivateKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < KEY_LEN {
        return Err(CryptoError::InvalidKeySize { expected: KEY_LEN, actual: blob.len() });
    }

    let (ephemeral_bytes, combined) = blob.split_at(KEY_LEN);
    let ephemeral_pub = AgreementPublicKey::from_slice(ephemeral_bytes)?;
    let recipient_pub = secret.public();

    let key =
        derive_session_key(secret.agree(&ephemeral_pub).as_bytes(), &ephemeral_pub, &recipient_pub);
    open(&key, combined)
}

/// Seal `plaintext` with a random nonce into the combined form
/// `nonce || ciphertext || tag`.
pub fn seal<R: RngCore + CryptoRng>(key: &MessageKey, plaintext: &[u8], rng: &mut R) -> Vec<u8> {
    let nonce: [u8; GCM_NONCE_LEN] = random_array(rng);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
        unreachable!("AES-GCM encryption cannot fail with valid inputs");
    };

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

/// Open a combined `nonce || ciphertext || tag` blob.
///
/// # Errors
///
/// - `InvalidKeySize` if the blob is too short to contain nonce and tag
/// - `CryptoFailure` if authentication fails
pub fn open(key: &MessageKey, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < GCM_NONCE_LEN + GCM_TAG_LEN {
        return Err(CryptoError::InvalidKeySize {
            expected: GCM_NONCE_LEN + GCM_TAG_LEN,
            actual: combined.len(),
        });
    }

    let (nonce, ciphertext) = combined.split_at(GCM_NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::CryptoFailure)
}

/// Seal a file under `key` with the file id as nonce, returning the detached
/// ciphertext/tag pair.
pub fn seal_file(key: &MessageKey, id: &[u8; GCM_NONCE_LEN], plaintext: &[u8]) -> SealedFile {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let Ok(mut ciphertext) = cipher.encrypt(Nonce::from_slice(id), plaintext) else {
        unreachable!("AES-GCM encryption cannot fail with valid inputs");
    };

    let split = ciphertext.len() - GCM_TAG_LEN;
    let mut tag = [0u8; GCM_TAG_LEN];
    tag.copy_from_slice(&ciphertext[split..]);
    ciphertext.truncate(split);

    SealedFile { ciphertext, tag }
}

/// Open a detached ciphertext/tag pair sealed by [`seal_file`].
///
/// # Errors
///
/// `CryptoFailure` if authentication fails.
pub fn open_file(
    key: &MessageKey,
    id: &[u8; GCM_NONCE_LEN],
    ciphertext: &[u8],
    tag: &[u8; GCM_TAG_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut combined = Vec::with_capacity(ciphertext.len() + GCM_TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(id), combined.as_slice())
        .map_err(|_| CryptoError::CryptoFailure)
}

/// SHA-256 digest.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Fill a fixed-size array with random bytes (ids, nonces, tokens).
pub fn random_array<const N: usize, R: RngCore + CryptoRng>(rng: &mut R) -> [u8; N] {
    let mut out = [0u8; N];
    rng.fill_bytes(&mut out);
    out
}

/// HKDF-SHA256 over the ECDH shared secret.
///
/// info = `ephemeral_pub || recipient_pub`, salt = [`HKDF_SALT`], 32-byte
/// output. Both sides must build the info in this order.
fn derive_session_key(
    shared: &[u8; KEY_LEN],
    ephemeral_pub: &AgreementPublicKey,
    recipient_pub: &AgreementPublicKey,
) -> MessageKey {
    let hkdf = Hkdf::<Sha256>::new(Some(HKDF_SALT), shared);

    let mut info = Vec::with_capacity(2 * KEY_LEN);
    info.extend_from_slice(ephemeral_pub.as_bytes());
    info.extend_from_slice(recipient_pub.as_bytes());

    let mut key = [0u8; KEY_LEN];
    let Ok(()) = hkdf.expand(&info, &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    MessageKey::from_bytes(key)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn encrypt_to_roundtrip() {
        let mut rng = rng();
        let recipient = AgreementPrivateKey::generate(&mut rng);

        let blob = encrypt_to(&recipient.public(), b"hello rendezvous", &mut rng);
        let plaintext = decrypt_from(&recipient, &blob).unwrap();

        assert_eq!(plaintext, b"hello rendezvous");
    }

    #[test]
    fn encrypt_to_layout() {
        let mut rng = rng();
        let recipient = AgreementPrivateKey::generate(&mut rng);

        let blob = encrypt_to(&recipient.public(), b"x", &mut rng);

        // ephemeral pub + nonce + 1 byte + tag
        assert_eq!(blob.len(), KEY_LEN + GCM_NONCE_LEN + 1 + GCM_TAG_LEN);
    }

    #[test]
    fn decrypt_from_rejects_short_input() {
        let recipient = AgreementPrivateKey::generate(&mut rng());
        let result = decrypt_from(&recipient, &[0u8; 31]);
        assert!(matches!(result, Err(CryptoError::InvalidKeySize { .. })));
    }

    #[test]
    fn decrypt_from_wrong_recipient_fails() {
        let mut rng = rng();
        let recipient = AgreementPrivateKey::generate(&mut rng);
        let other = AgreementPrivateKey::generate(&mut rng);

        let blob = encrypt_to(&recipient.public(), b"secret", &mut rng);
        assert_eq!(decrypt_from(&other, &blob), Err(CryptoError::CryptoFailure));
    }

    #[test]
    fn tampered_blob_fails() {
        let mut rng = rng();
        let recipient = AgreementPrivateKey::generate(&mut rng);

        let mut blob = encrypt_to(&recipient.public(), b"secret", &mut rng);
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;

        assert_eq!(decrypt_from(&recipient, &blob), Err(CryptoError::CryptoFailure));
    }

    #[test]
    fn seal_open_roundtrip() {
        let mut rng = rng();
        let key = MessageKey::generate(&mut rng);

        let combined = seal(&key, b"metadata", &mut rng);
        assert_eq!(open(&key, &combined).unwrap(), b"metadata");
    }

    #[test]
    fn open_rejects_truncated_blob() {
        let key = MessageKey::generate(&mut rng());
        assert!(matches!(open(&key, &[0u8; 10]), Err(CryptoError::InvalidKeySize { .. })));
    }

    #[test]
    fn sealed_file_roundtrip() {
        let mut rng = rng();
        let key = MessageKey::generate(&mut rng);
        let id = [0x08; GCM_NONCE_LEN];
        let data = vec![0x2A; 250];

        let sealed = seal_file(&key, &id, &data);
        assert_eq!(sealed.ciphertext.len(), data.len());

        let plaintext = open_file(&key, &id, &sealed.ciphertext, &sealed.tag).unwrap();
        assert_eq!(plaintext, data);
    }

    #[test]
    fn sealed_file_tamper_detected() {
        let mut rng = rng();
        let key = MessageKey::generate(&mut rng);
        let id = [0x08; GCM_NONCE_LEN];

        let mut sealed = seal_file(&key, &id, &[0x2A; 250]);
        sealed.ciphertext[17] ^= 0x01;

        assert_eq!(
            open_file(&key, &id, &sealed.ciphertext, &sealed.tag),
            Err(CryptoError::CryptoFailure)
        );
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string
        let expected = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(sha256(b""), expected);
    }

    proptest! {
        #[test]
        fn prop_encrypt_to_roundtrips(seed: u64, plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut rng = StdRng::seed_from_u64(seed);
            let recipient = AgreementPrivateKey::generate(&mut rng);

            let blob = encrypt_to(&recipient.public(), &plaintext, &mut rng);
            prop_assert_eq!(decrypt_from(&recipient, &blob).unwrap(), plaintext);
        }

        #[test]
        fn prop_seal_open_roundtrips(seed: u64, plaintext in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut rng = StdRng::seed_from_u64(seed);
            let key = MessageKey::generate(&mut rng);

            let combined = seal(&key, &plaintext, &mut rng);
            prop_assert_eq!(open(&key, &combined).unwrap(), plaintext);
        }
    }
}
