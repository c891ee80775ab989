//! Persisted client state.
//!
//! A device serializes its complete observable state into one CBOR blob; the
//! caller decides where the blob lives. Restoring the blob reproduces the
//! prekey store, the topic-key pool, and every topic including chain state
//! and still-unverified updates.

use rendezvous_crypto::{AgreementPrivateKey, AgreementPublicKey, SigningPrivateKey};
use rendezvous_proto::{AuthToken, UserInfo};
use serde::{Deserialize, Serialize};

use crate::{error::Result, topic::Topic, topic_keys::TopicKeys};

/// One stored prekey pair. The public half is the map key in the live store;
/// both halves are kept so the store can be rebuilt exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrekeyPair {
    /// Published public half.
    pub public: AgreementPublicKey,
    /// Private half, consumed when a topic-key message references it.
    pub secret: AgreementPrivateKey,
}

/// Complete serializable device state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientData {
    /// Base URL of the home server.
    pub server_url: String,
    /// Application identifier of this device.
    pub app_id: String,
    /// User identity key.
    pub user_key: SigningPrivateKey,
    /// Device identity key.
    pub device_key: SigningPrivateKey,
    /// Latest accepted user record.
    pub user_info: UserInfo,
    /// Device auth token.
    pub auth_token: AuthToken,
    /// Unconsumed prekeys.
    pub prekeys: Vec<PrekeyPair>,
    /// Unused topic keys.
    pub topic_keys: Vec<TopicKeys>,
    /// All known topics, including chain state and pending updates.
    pub topics: Vec<Topic>,
}

impl ClientData {
    /// Encode to a single binary blob.
    ///
    /// # Errors
    ///
    /// `SerializationFailed` if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rendezvous_proto::to_bytes(self)?)
    }

    /// Decode from a blob produced by [`ClientData::to_bytes`].
    ///
    /// # Errors
    ///
    /// `InvalidServerData` if the blob does not decode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rendezvous_proto::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};
    use rendezvous_crypto::MessageKey;
    use rendezvous_proto::{Role, TopicId};

    use crate::{topic::Member, user_info::build_user_info};

    use super::*;

    #[test]
    fn client_data_roundtrip() {
        let mut rng = StdRng::seed_from_u64(9);
        let user = SigningPrivateKey::generate(&mut rng);
        let device = SigningPrivateKey::generate(&mut rng);
        let prekey = AgreementPrivateKey::generate(&mut rng);
        let topic_keys = TopicKeys::generate(&user, &mut rng);

        let topic_signing = SigningPrivateKey::generate(&mut rng);
        let topic_encryption = AgreementPrivateKey::generate(&mut rng);
        let topic = Topic::new(
            TopicId([3; 12]),
            50,
            50,
            vec![Member {
                user_key: user.public(),
                signature_key: topic_signing.public(),
                encryption_key: topic_encryption.public(),
                role: Role::Admin,
            }],
            MessageKey::generate(&mut rng),
            topic_signing,
            topic_encryption,
        );

        let info = build_user_info(
            &user,
            "alice",
            50,
            1,
            vec![rendezvous_proto::DeviceInfo {
                device_key: device.public(),
                creation_time: 50,
                is_active: true,
                app_id: "rdv".to_string(),
            }],
        );

        let data = ClientData {
            server_url: "https://rendezvous.example".to_string(),
            app_id: "rdv".to_string(),
            user_key: user,
            device_key: device,
            user_info: info,
            auth_token: AuthToken([7; 16]),
            prekeys: vec![PrekeyPair { public: prekey.public(), secret: prekey }],
            topic_keys: vec![topic_keys],
            topics: vec![topic],
        };

        let restored = ClientData::from_bytes(&data.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, data);
    }
}
