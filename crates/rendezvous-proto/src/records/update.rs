//! Content update, chain state, and receipt records.

use rendezvous_crypto::Signature;
use serde::{Deserialize, Serialize};

use crate::FILE_ID_LEN;

use super::{TopicId, put_var};

/// Descriptor of one encrypted file attached to an update.
///
/// The ciphertext itself is stored server-side, addressed by
/// `(topic_id, id)`; this descriptor is what travels inside messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File id; doubles as the AES-GCM nonce.
    pub id: [u8; FILE_ID_LEN],
    /// Detached GCM authentication tag.
    pub tag: [u8; 16],
    /// SHA-256 of the stored ciphertext.
    pub hash: [u8; 32],
}

/// A file descriptor together with its ciphertext, as posted in an
/// [`UpdateUpload`]. The server strips the ciphertext before fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    /// Descriptor covered by the update signature.
    pub record: FileRecord,
    /// Ciphertext to store (tag excluded; `record.hash` binds it).
    pub ciphertext: Vec<u8>,
}

/// Body of `topic/message`: one signed content update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUpload {
    /// Target topic.
    pub topic_id: TopicId,
    /// The sender's index in the topic member list.
    pub sender_index: u32,
    /// Metadata sealed under the topic message key (combined GCM form).
    pub metadata: Vec<u8>,
    /// Attached files.
    pub files: Vec<FileUpload>,
    /// Sender's topic-signing-key signature over [`update_signing_bytes`].
    pub signature: Signature,
}

/// Authoritative chain position returned by the server after an upload.
///
/// The client accepts it only if `output` equals
/// `SHA-256(prev_verified_output || signature)` at `chain_index =
/// prev_chain_index + 1`; anything else means the server reordered,
/// dropped, or tampered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Position in the topic's update chain.
    pub chain_index: u32,
    /// Running chain output at that position.
    pub output: [u8; 32],
}

/// A content update as delivered to receiving devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Topic the update belongs to.
    pub topic_id: TopicId,
    /// Server-assigned chain position.
    pub chain_index: u32,
    /// Server-computed chain output at `chain_index`.
    pub output: [u8; 32],
    /// The sender's index in the topic member list.
    pub sender_index: u32,
    /// Metadata sealed under the topic message key (combined GCM form).
    pub metadata: Vec<u8>,
    /// Attached file descriptors.
    pub files: Vec<FileRecord>,
    /// Sender's topic-signing-key signature over [`update_signing_bytes`].
    pub signature: Signature,
}

/// Observation that a member's device has verified a topic chain up to
/// `chain_index`.
///
/// `sender` is raw bytes on purpose: receipts are advisory and a malformed
/// sender key drops the receipt rather than failing the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    /// Topic the receipt refers to.
    pub topic_id: TopicId,
    /// Chain position the observer has verified.
    pub chain_index: u32,
    /// Observing user's signing public key (32 bytes when well-formed).
    pub sender: Vec<u8>,
}

/// Canonical unsigned bytes of an update, covered by its signature.
///
/// Server-assigned fields (`chain_index`, `output`) are excluded: the
/// signature is produced before the server sees the update. The chain output
/// fold in turn covers the signature, which transitively pins these bytes.
pub fn update_signing_bytes(
    topic_id: &TopicId,
    sender_index: u32,
    metadata: &[u8],
    files: &[FileRecord],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + metadata.len() + files.len() * 60);
    out.extend_from_slice(topic_id.as_bytes());
    out.extend_from_slice(&sender_index.to_be_bytes());
    put_var(&mut out, metadata);
    out.extend_from_slice(&(files.len() as u32).to_be_bytes());
    for file in files {
        out.extend_from_slice(&file.id);
        out.extend_from_slice(&file.tag);
        out.extend_from_slice(&file.hash);
    }
    out
}

impl MessageRecord {
    /// Canonical unsigned bytes of this update.
    pub fn signing_bytes(&self) -> Vec<u8> {
        update_signing_bytes(&self.topic_id, self.sender_index, &self.metadata, &self.files)
    }
}

impl UpdateUpload {
    /// Canonical unsigned bytes of this update.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let records: Vec<FileRecord> = self.files.iter().map(|f| f.record).collect();
        update_signing_bytes(&self.topic_id, self.sender_index, &self.metadata, &records)
    }
}
