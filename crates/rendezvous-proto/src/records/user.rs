//! User identity records.

use rendezvous_crypto::{Signature, SigningPublicKey};
use serde::{Deserialize, Serialize};

use crate::AUTH_TOKEN_LEN;

use super::{SignedPrekey, TopicKeyPublic, put_var};

/// One device entry inside a signed [`UserInfo`] record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// The device's signing public key.
    pub device_key: SigningPublicKey,
    /// Creation time in Unix seconds. Devices are listed ascending by this.
    pub creation_time: u64,
    /// Whether the device currently receives messages.
    pub is_active: bool,
    /// Application identifier, at most [`crate::MAX_APP_ID_LEN`] bytes.
    pub app_id: String,
}

/// Signed record of a user and all their devices.
///
/// # Invariants
///
/// - `devices` sorted ascending by `creation_time`
/// - `timestamp` strictly increases across updates
/// - `signature` verifies under `user_key` over [`UserInfo::signing_bytes`]
/// - `user_key`, `name`, `creation_time` never change across updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// The user's signing public key; the stable user identifier.
    pub user_key: SigningPublicKey,
    /// Display name, at most [`crate::MAX_NAME_LEN`] characters.
    pub name: String,
    /// Creation time in Unix seconds; immutable.
    pub creation_time: u64,
    /// Update counter; strictly increases with every replacement.
    pub timestamp: u64,
    /// All devices of the user.
    pub devices: Vec<DeviceInfo>,
    /// Signature by the user key over [`UserInfo::signing_bytes`].
    pub signature: Signature,
}

impl UserInfo {
    /// Canonical bytes covered by `signature`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.devices.len() * 64);
        out.extend_from_slice(self.user_key.as_bytes());
        put_var(&mut out, self.name.as_bytes());
        out.extend_from_slice(&self.creation_time.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        for device in &self.devices {
            out.extend_from_slice(device.device_key.as_bytes());
            out.extend_from_slice(&device.creation_time.to_be_bytes());
            out.push(u8::from(device.is_active));
            put_var(&mut out, device.app_id.as_bytes());
        }
        out
    }
}

/// Body of `user/register`: everything a new first device publishes at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationBundle {
    /// The initial signed user record (one device).
    pub user_info: UserInfo,
    /// The pin issued by the administrator.
    pub pin: u32,
    /// Initial signed prekeys of the registering device.
    pub prekeys: Vec<SignedPrekey>,
    /// Initial topic keys of the user.
    pub topic_keys: Vec<TopicKeyPublic>,
}

/// Response of `user/allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedUser {
    /// Registration pin in `0..PIN_MODULUS`.
    pub pin: u32,
    /// Absolute expiry of the pin in Unix seconds.
    pub expiry: u64,
}

/// 16-byte bearer token authenticating a device (or the administrator).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthToken(pub [u8; AUTH_TOKEN_LEN]);

impl AuthToken {
    /// The all-zero token the development server boots with.
    pub const ZERO: Self = Self([0u8; AUTH_TOKEN_LEN]);

    /// Wrap a byte slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Raw token bytes.
    pub fn as_bytes(&self) -> &[u8; AUTH_TOKEN_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens are bearer credentials; never log them.
        f.write_str("AuthToken(..)")
    }
}
