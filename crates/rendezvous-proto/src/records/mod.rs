//! Wire record definitions, grouped by protocol area.

mod download;
mod keys;
mod topic;
mod update;
mod user;

pub use download::DeviceDownload;
pub use keys::{
    DevicePrekeyBundle, DevicePrekeys, DeviceTopicKeys, PrekeyUpload, SignedPrekey,
    TopicKeyBundle, TopicKeyMessage, TopicKeyPublic, TopicKeyRequest, TopicKeyResponse,
    binding_bytes,
};
pub use topic::{MemberRecord, Role, TopicId, TopicRecord, topic_signing_bytes};
pub use update::{
    ChainState, FileRecord, FileUpload, MessageRecord, ReceiptRecord, UpdateUpload,
    update_signing_bytes,
};
pub use user::{AllowedUser, AuthToken, DeviceInfo, RegistrationBundle, UserInfo};

/// Append a length-prefixed variable field to a signing-byte buffer.
///
/// All variable-length fields inside `signing_bytes()` outputs are prefixed
/// with their u16 big-endian length so the concatenation is unambiguous.
pub(crate) fn put_var(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&bytes[..usize::from(len)]);
}
