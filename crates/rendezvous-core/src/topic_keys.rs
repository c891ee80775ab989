//! Per-user topic keys: generation, distribution, and acceptance.
//!
//! A topic key is a signing/encryption key pair owned by one user and
//! consumed once to admit that user into a topic. The public halves travel
//! as a bundle signed by the user identity key; the private halves are fanned
//! out to the user's other devices encrypted to one of their prekeys.

use rand::{CryptoRng, RngCore};
use rendezvous_crypto::{
    AgreementPrivateKey, AgreementPublicKey, CryptoError, KEY_LEN, MessageKey, SigningPrivateKey,
    SigningPublicKey, decrypt_from, encrypt_to,
};
use rendezvous_proto::{
    MemberRecord, Role, TopicKeyMessage, TopicKeyPublic, TopicKeyResponse, binding_bytes,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{RendezvousError, Result};

/// A full topic key: both private halves plus the signed public bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicKeys {
    signing: SigningPrivateKey,
    encryption: AgreementPrivateKey,
    public: TopicKeyPublic,
}

impl TopicKeys {
    /// Generate a fresh topic key owned by `user`.
    ///
    /// Produces independent signing and encryption pairs and binds them to
    /// the user with a signature over `signature_key || encryption_key`.
    pub fn generate<R: RngCore + CryptoRng>(user: &SigningPrivateKey, rng: &mut R) -> Self {
        let signing = SigningPrivateKey::generate(rng);
        let encryption = AgreementPrivateKey::generate(rng);

        let signature_key = signing.public();
        let encryption_key = encryption.public();
        let signature = user.sign(&binding_bytes(&signature_key, &encryption_key));

        let public =
            TopicKeyPublic { user_key: user.public(), signature_key, encryption_key, signature };

        Self { signing, encryption, public }
    }

    /// Package this key for delivery to a peer device of the same user.
    ///
    /// The plaintext is the fixed-layout `signing_priv || encryption_priv`
    /// (exactly two raw keys), encrypted to the peer's prekey.
    pub fn wrap_for<R: RngCore + CryptoRng>(
        &self,
        peer_prekey: &AgreementPublicKey,
        rng: &mut R,
    ) -> TopicKeyMessage {
        let mut plaintext = [0u8; 2 * KEY_LEN];
        plaintext[..KEY_LEN].copy_from_slice(&self.signing.to_bytes());
        plaintext[KEY_LEN..].copy_from_slice(&self.encryption.to_bytes());

        let ciphertext = encrypt_to(peer_prekey, &plaintext, rng);
        plaintext.zeroize();

        TopicKeyMessage { device_prekey: *peer_prekey, topic_key: self.public, ciphertext }
    }

    /// Accept a topic key delivered by another device of the same user.
    ///
    /// Verifies the signed bundle under `sender`, decrypts the private
    /// halves with the consumed prekey, and checks that each private key
    /// reproduces its public counterpart.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the bundle is not owned by `sender` or its
    ///   binding signature fails
    /// - `Crypto` if decryption fails, the plaintext has the wrong length,
    ///   or a private key does not match the bundle
    pub fn accept(
        message: &TopicKeyMessage,
        prekey: &AgreementPrivateKey,
        sender: &SigningPublicKey,
    ) -> Result<Self> {
        verify_topic_key(&message.topic_key, sender)?;

        let mut plaintext = decrypt_from(prekey, &message.ciphertext)?;
        if plaintext.len() != 2 * KEY_LEN {
            plaintext.zeroize();
            return Err(RendezvousError::Crypto(CryptoError::CryptoFailure));
        }

        let mut signing_bytes = [0u8; KEY_LEN];
        let mut encryption_bytes = [0u8; KEY_LEN];
        signing_bytes.copy_from_slice(&plaintext[..KEY_LEN]);
        encryption_bytes.copy_from_slice(&plaintext[KEY_LEN..]);
        plaintext.zeroize();

        let signing = SigningPrivateKey::from_bytes(&signing_bytes);
        let encryption = AgreementPrivateKey::from_bytes(encryption_bytes);
        signing_bytes.zeroize();
        encryption_bytes.zeroize();

        if signing.public() != message.topic_key.signature_key
            || encryption.public() != message.topic_key.encryption_key
        {
            return Err(RendezvousError::Crypto(CryptoError::CryptoFailure));
        }

        Ok(Self { signing, encryption, public: message.topic_key })
    }

    /// The signed public bundle.
    pub fn public(&self) -> &TopicKeyPublic {
        &self.public
    }

    /// Private signing half.
    pub fn signing(&self) -> &SigningPrivateKey {
        &self.signing
    }

    /// Private encryption half.
    pub fn encryption(&self) -> &AgreementPrivateKey {
        &self.encryption
    }

    /// Consume the key into its private halves (topic admission).
    pub fn into_parts(self) -> (SigningPrivateKey, AgreementPrivateKey) {
        (self.signing, self.encryption)
    }
}

/// Verify a public topic-key bundle against a supplied user key.
///
/// # Errors
///
/// `InvalidSignature` if the bundle names a different owner or the binding
/// signature fails.
pub fn verify_topic_key(bundle: &TopicKeyPublic, user: &SigningPublicKey) -> Result<()> {
    if &bundle.user_key != user {
        return Err(RendezvousError::InvalidSignature);
    }
    user.verify(&bundle.signing_bytes(), &bundle.signature)?;
    Ok(())
}

/// Verify every bundle in a bulk topic-key response against its embedded
/// owner.
///
/// # Errors
///
/// `InvalidSignature` on the first bundle whose binding fails.
pub fn verify_topic_key_response(response: &TopicKeyResponse) -> Result<()> {
    for bundle in &response.keys {
        verify_topic_key(bundle, &bundle.user_key)?;
    }
    Ok(())
}

/// Build a member record admitting `bundle`'s owner into a topic.
///
/// Encrypts the topic message key to the member's topic encryption key and
/// carries the bundle's binding fields so receivers can re-verify ownership.
pub fn encrypt_member_key<R: RngCore + CryptoRng>(
    bundle: &TopicKeyPublic,
    role: Role,
    message_key: &MessageKey,
    rng: &mut R,
) -> MemberRecord {
    let encrypted_message_key = encrypt_to(&bundle.encryption_key, message_key.as_bytes(), rng);

    MemberRecord {
        user_key: bundle.user_key,
        signature_key: bundle.signature_key,
        encryption_key: bundle.encryption_key,
        signature: bundle.signature,
        role,
        encrypted_message_key,
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use rendezvous_crypto::CryptoError;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(3)
    }

    #[test]
    fn generate_binds_key_to_user() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);

        let keys = TopicKeys::generate(&user, &mut rng);

        assert_eq!(keys.public().user_key, user.public());
        assert!(verify_topic_key(keys.public(), &user.public()).is_ok());
    }

    #[test]
    fn wrap_accept_roundtrip() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let prekey = AgreementPrivateKey::generate(&mut rng);

        let keys = TopicKeys::generate(&user, &mut rng);
        let message = keys.wrap_for(&prekey.public(), &mut rng);

        let accepted = TopicKeys::accept(&message, &prekey, &user.public()).unwrap();
        assert_eq!(accepted, keys);
    }

    #[test]
    fn accept_rejects_foreign_bundle() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let impostor = SigningPrivateKey::generate(&mut rng);
        let prekey = AgreementPrivateKey::generate(&mut rng);

        let keys = TopicKeys::generate(&user, &mut rng);
        let message = keys.wrap_for(&prekey.public(), &mut rng);

        let result = TopicKeys::accept(&message, &prekey, &impostor.public());
        assert_eq!(result, Err(RendezvousError::InvalidSignature));
    }

    #[test]
    fn accept_rejects_wrong_prekey() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let prekey = AgreementPrivateKey::generate(&mut rng);
        let wrong = AgreementPrivateKey::generate(&mut rng);

        let keys = TopicKeys::generate(&user, &mut rng);
        let message = keys.wrap_for(&prekey.public(), &mut rng);

        let result = TopicKeys::accept(&message, &wrong, &user.public());
        assert_eq!(result, Err(RendezvousError::Crypto(CryptoError::CryptoFailure)));
    }

    #[test]
    fn accept_rejects_substituted_private_keys() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let prekey = AgreementPrivateKey::generate(&mut rng);

        let keys = TopicKeys::generate(&user, &mut rng);
        let other = TopicKeys::generate(&user, &mut rng);

        // Valid bundle, but the ciphertext carries a different key pair.
        let mut message = other.wrap_for(&prekey.public(), &mut rng);
        message.topic_key = *keys.public();

        let result = TopicKeys::accept(&message, &prekey, &user.public());
        assert_eq!(result, Err(RendezvousError::Crypto(CryptoError::CryptoFailure)));
    }

    #[test]
    fn member_key_roundtrips_through_member_record() {
        let mut rng = rng();
        let user = SigningPrivateKey::generate(&mut rng);
        let keys = TopicKeys::generate(&user, &mut rng);
        let message_key = MessageKey::generate(&mut rng);

        let member = encrypt_member_key(keys.public(), Role::Participant, &message_key, &mut rng);

        assert_eq!(member.user_key, user.public());
        assert!(member.user_key.verify(&member.binding_bytes(), &member.signature).is_ok());

        let decrypted = decrypt_from(keys.encryption(), &member.encrypted_message_key).unwrap();
        assert_eq!(decrypted, message_key.as_bytes());
    }

    #[test]
    fn bulk_response_verification() {
        let mut rng = rng();
        let alice = SigningPrivateKey::generate(&mut rng);
        let bob = SigningPrivateKey::generate(&mut rng);

        let mut response = TopicKeyResponse {
            keys: vec![
                *TopicKeys::generate(&alice, &mut rng).public(),
                *TopicKeys::generate(&bob, &mut rng).public(),
            ],
        };
        assert!(verify_topic_key_response(&response).is_ok());

        // Re-attribute bob's key to alice: binding no longer verifies.
        response.keys[1].user_key = alice.public();
        assert_eq!(verify_topic_key_response(&response), Err(RendezvousError::InvalidSignature));
    }
}
