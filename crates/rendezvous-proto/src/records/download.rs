//! Device download envelope.

use serde::{Deserialize, Serialize};

use super::{MessageRecord, ReceiptRecord, TopicKeyMessage, TopicRecord, UserInfo};

/// Everything waiting for a device, drained by `device/messages`.
///
/// Receivers process the parts strictly in field order: user-info update,
/// topic-key messages, new/changed topics, content updates, receipts. Later
/// parts may depend on earlier ones (a message for a topic announced in the
/// same batch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDownload {
    /// Replacement user record, if it changed since the last download.
    pub user_info: Option<UserInfo>,
    /// Topic keys delivered by the user's other devices.
    pub topic_key_messages: Vec<TopicKeyMessage>,
    /// Topics this device was added to, or whose membership changed.
    pub topics: Vec<TopicRecord>,
    /// Content updates.
    pub messages: Vec<MessageRecord>,
    /// Chain observations by other members' devices.
    pub receipts: Vec<ReceiptRecord>,
}

impl DeviceDownload {
    /// Whether the envelope carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.user_info.is_none()
            && self.topic_key_messages.is_empty()
            && self.topics.is_empty()
            && self.messages.is_empty()
            && self.receipts.is_empty()
    }
}
