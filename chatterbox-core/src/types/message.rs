use super::Username;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Largest attachment the upload UI agrees to hand to the client (10 MiB).
/// The conversation store itself does not enforce this; senders check it
/// before a transfer is attempted.
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// A single entry in a peer conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: Username,
    pub receiver: Username,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    File(FileAttachment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileAttachment {
    pub file_name: String,
    pub file_size: u64,
    pub data: Bytes,
}

impl ChatMessage {
    pub fn is_file(&self) -> bool {
        matches!(self.content, MessageContent::File(_))
    }

    /// The conversation partner this message belongs to, from the point of
    /// view of `local_user`.
    pub fn peer_for(&self, local_user: &str) -> &str {
        if self.sender == local_user {
            &self.receiver
        } else {
            &self.sender
        }
    }
}
