//! Events produced by the receive pipeline.
//!
//! The pipeline returns a flat list of events instead of calling into a
//! delegate object; the caller executes them in order. This keeps the topic
//! state free of back-references and makes delivery guarantees testable by
//! counting.

use rendezvous_crypto::SigningPublicKey;
use rendezvous_proto::{DeviceInfo, TopicId};

use crate::topic::Update;

/// One observable outcome of processing a downloaded or pushed record.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A new device appeared in the user's record.
    UserDeviceAdded(DeviceInfo),

    /// An existing device entry changed (activity flag, app id).
    UserDeviceChanged(DeviceInfo),

    /// A device disappeared from the user's record.
    UserDeviceRemoved(DeviceInfo),

    /// The device was admitted to a new topic.
    TopicAdded(TopicId),

    /// A known topic's membership or roles changed.
    TopicUpdated(TopicId),

    /// A content update arrived.
    ///
    /// Emitted exactly once per incoming update. `verified` is true when the
    /// update extended the verified chain immediately; false when it is
    /// queued waiting for a predecessor.
    UpdateReceived {
        /// The decrypted update.
        update: Update,
        /// Whether the chain verified it in this pass.
        verified: bool,
    },

    /// A previously queued update verified after a gap filled in.
    UpdateVerifiedLate {
        /// Topic the update belongs to.
        topic_id: TopicId,
        /// Chain position that is now verified.
        chain_index: u32,
    },

    /// An update failed chain verification; the chain did not advance.
    InvalidChain {
        /// Topic the update belongs to.
        topic_id: TopicId,
        /// Chain position that failed.
        chain_index: u32,
    },

    /// Another member's device reported its verified chain position.
    ChainStateReceived {
        /// Topic the receipt refers to.
        topic_id: TopicId,
        /// Chain position the observer has verified.
        chain_index: u32,
        /// The observing user.
        sender: SigningPublicKey,
    },
}
