//! Rendezvous wire protocol records.
//!
//! CBOR-encoded request and response bodies for every server endpoint, plus
//! the protocol constants. Records use CBOR for type safety and forward
//! compatibility, but signatures are never computed over the codec output:
//! every signed record exposes an explicit `signing_bytes()` builder that
//! produces a deterministic byte string independent of serialization.
//!
//! # Invariants
//!
//! - Round-trip encoding must produce identical values.
//! - `signing_bytes()` output is stable across releases; changing it breaks
//!   every previously issued signature.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod records;

pub use codec::{CodecError, from_bytes, to_bytes};
pub use records::{
    AllowedUser, AuthToken, ChainState, DeviceDownload, DeviceInfo, DevicePrekeyBundle,
    DevicePrekeys, DeviceTopicKeys, FileRecord, FileUpload, MemberRecord, MessageRecord,
    PrekeyUpload, ReceiptRecord, RegistrationBundle, Role, SignedPrekey, TopicId, TopicKeyBundle,
    TopicKeyMessage, TopicKeyPublic, TopicKeyRequest, TopicKeyResponse, TopicRecord, UpdateUpload,
    UserInfo, binding_bytes, topic_signing_bytes, update_signing_bytes,
};

/// Length of the server auth token.
pub const AUTH_TOKEN_LEN: usize = 16;

/// Length of a topic id.
pub const TOPIC_ID_LEN: usize = 12;

/// Length of a message/file id (doubles as the AES-GCM nonce).
pub const FILE_ID_LEN: usize = 12;

/// Length of a topic message key.
pub const MESSAGE_KEY_LEN: usize = 32;

/// Maximum user name length in characters.
pub const MAX_NAME_LEN: usize = 32;

/// Maximum application id length in bytes.
pub const MAX_APP_ID_LEN: usize = 10;

/// Maximum encrypted metadata length in bytes.
pub const MAX_METADATA_LEN: usize = 100;

/// Registration pins are drawn from `0..PIN_MODULUS`.
pub const PIN_MODULUS: u32 = 100_000;

/// Failed pin attempts allowed before an allowance is revoked.
pub const PIN_RETRIES: u32 = 3;

/// Pin validity window in seconds (224 hours, a little over 9 days).
pub const PIN_EXPIRY_SECS: u64 = 60 * 60 * 32 * 7;
