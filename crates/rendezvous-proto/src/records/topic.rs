//! Topic and membership records.

use rendezvous_crypto::{AgreementPublicKey, Signature, SigningPublicKey};
use serde::{Deserialize, Serialize};

use crate::TOPIC_ID_LEN;

use super::{keys::binding_bytes, put_var};

/// Random 12-byte topic identifier. Also the seed of the topic's hash chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId(pub [u8; TOPIC_ID_LEN]);

impl TopicId {
    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; TOPIC_ID_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TopicId({self})")
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A member's role inside a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// May change membership and post.
    Admin,
    /// May post.
    Participant,
    /// Read-only.
    Observer,
}

impl Role {
    /// Whether this role may post updates.
    pub fn can_write(self) -> bool {
        !matches!(self, Self::Observer)
    }

    /// Stable byte used in signing bytes.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Admin => 0,
            Self::Participant => 1,
            Self::Observer => 2,
        }
    }
}

/// One member entry in a [`TopicRecord`].
///
/// `signature` is the member's own user-key signature over
/// `signature_key || encryption_key`. It is the same binding that ships in
/// the member's topic-key bundle, carried here so every receiver can
/// re-verify it without extra fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// The member's stable user key.
    pub user_key: SigningPublicKey,
    /// The member's topic signing key (from their consumed topic key).
    pub signature_key: SigningPublicKey,
    /// The member's topic encryption key (from their consumed topic key).
    pub encryption_key: AgreementPublicKey,
    /// User-key signature binding the two topic keys to the user.
    pub signature: Signature,
    /// The member's role.
    pub role: Role,
    /// The topic message key, encrypted to `encryption_key`.
    pub encrypted_message_key: Vec<u8>,
}

impl MemberRecord {
    /// Bytes covered by the member's binding `signature`.
    pub fn binding_bytes(&self) -> Vec<u8> {
        binding_bytes(&self.signature_key, &self.encryption_key)
    }
}

/// Signed topic description as it travels over the wire.
///
/// # Invariants
///
/// - The creator's entry is `members[0]` and its role is `Admin`.
/// - `signature` verifies under `members[0].signature_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecord {
    /// Topic identifier.
    pub id: TopicId,
    /// Creation time in Unix seconds; immutable.
    pub creation_time: u64,
    /// Update counter for membership changes.
    pub timestamp: u64,
    /// All members, creator first.
    pub members: Vec<MemberRecord>,
    /// Creator's topic-signing-key signature over
    /// [`TopicRecord::signing_bytes`].
    pub signature: Signature,
}

/// Canonical bytes covered by a topic record signature.
///
/// Free function so the creator can sign before the record (which embeds the
/// signature) exists.
pub fn topic_signing_bytes(
    id: &TopicId,
    creation_time: u64,
    timestamp: u64,
    members: &[MemberRecord],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + members.len() * 224);
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(&creation_time.to_be_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());
    for member in members {
        out.extend_from_slice(member.user_key.as_bytes());
        out.extend_from_slice(member.signature_key.as_bytes());
        out.extend_from_slice(member.encryption_key.as_bytes());
        out.extend_from_slice(&member.signature.to_bytes());
        out.push(member.role.as_u8());
        put_var(&mut out, &member.encrypted_message_key);
    }
    out
}

impl TopicRecord {
    /// Canonical bytes covered by `signature`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        topic_signing_bytes(&self.id, self.creation_time, self.timestamp, &self.members)
    }

    /// Index of the member whose user key is `user`, if any.
    pub fn member_index(&self, user: &SigningPublicKey) -> Option<usize> {
        self.members.iter().position(|m| &m.user_key == user)
    }
}
