//! Prekey and topic-key records.

use rendezvous_crypto::{AgreementPublicKey, Signature, SigningPublicKey};
use serde::{Deserialize, Serialize};

/// An ephemeral key-agreement key published by a device, signed by that
/// device's identity key so peers can trust it without interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPrekey {
    /// Public half of the prekey pair.
    pub key: AgreementPublicKey,
    /// Device-key signature over the raw prekey bytes.
    pub signature: Signature,
}

impl SignedPrekey {
    /// Bytes covered by `signature`.
    pub fn signing_bytes(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

/// Body of `device/prekeys`: fresh prekeys published by the calling device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrekeyUpload {
    /// Prekeys to append to the device's server-side pool.
    pub prekeys: Vec<SignedPrekey>,
}

/// Prekeys for one device inside a [`DevicePrekeyBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePrekeys {
    /// The device these prekeys belong to.
    pub device_key: SigningPublicKey,
    /// Exactly `key_count` prekeys, each signed by `device_key`.
    pub prekeys: Vec<SignedPrekey>,
}

/// Response of `user/prekeys`: prekeys for every *other* device of the
/// calling user, used to fan out fresh topic keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePrekeyBundle {
    /// Number of prekeys per device in this bundle.
    pub key_count: u32,
    /// One entry per peer device.
    pub devices: Vec<DevicePrekeys>,
}

/// Public half of a per-user topic key, bound to its owner.
///
/// `signature` is the user-key signature over
/// `signature_key || encryption_key`; it proves the pair belongs to
/// `user_key` without the server's help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeyPublic {
    /// Owner of the topic key.
    pub user_key: SigningPublicKey,
    /// Signing half; authenticates the user's updates inside a topic.
    pub signature_key: SigningPublicKey,
    /// Encryption half; receives the topic message key.
    pub encryption_key: AgreementPublicKey,
    /// User-key signature binding both halves to the user.
    pub signature: Signature,
}

impl TopicKeyPublic {
    /// Bytes covered by `signature`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        binding_bytes(&self.signature_key, &self.encryption_key)
    }
}

/// Canonical binding bytes `signature_key || encryption_key`.
///
/// Shared between topic-key bundles and topic member records, which carry
/// the same binding signature. Exposed so new bundles can be signed before
/// the record holding the signature exists.
pub fn binding_bytes(
    signature_key: &SigningPublicKey,
    encryption_key: &AgreementPublicKey,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(signature_key.as_bytes());
    out.extend_from_slice(encryption_key.as_bytes());
    out
}

/// Delivery of one topic key to one peer device of the same user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeyMessage {
    /// The receiving device's prekey this message consumes.
    pub device_prekey: AgreementPublicKey,
    /// Public bundle of the delivered topic key.
    pub topic_key: TopicKeyPublic,
    /// `encrypt_to(device_prekey, signing_priv || encryption_priv)`.
    pub ciphertext: Vec<u8>,
}

/// Topic-key messages addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTopicKeys {
    /// Receiving device.
    pub device_key: SigningPublicKey,
    /// One message per freshly generated topic key.
    pub messages: Vec<TopicKeyMessage>,
}

/// Body of `user/topickeys`: freshly generated topic keys plus their
/// per-device distribution messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeyBundle {
    /// Public bundles to add to the user's server-side pool.
    pub topic_keys: Vec<TopicKeyPublic>,
    /// Distribution messages, excluding the uploading device.
    pub messages: Vec<DeviceTopicKeys>,
}

/// Body of `users/topickey`: request one topic key per listed user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeyRequest {
    /// Users to fetch a topic key for.
    pub users: Vec<SigningPublicKey>,
}

/// Response of `users/topickey`.
///
/// Users without an available topic key are absent; each returned bundle
/// names its owner in `user_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicKeyResponse {
    /// One consumed topic key per served user.
    pub keys: Vec<TopicKeyPublic>,
}
