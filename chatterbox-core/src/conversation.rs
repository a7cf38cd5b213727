use crate::types::Username;
use crate::types::message::ChatMessage;
use std::collections::HashMap;

/// Append-only per-peer message logs.
///
/// Each message lives in exactly one log, keyed by the *other* party of the
/// conversation regardless of direction. Ordering is insertion order within a
/// peer's log; there is no global order. Logs are never pruned here,
/// retention is the embedding application's concern.
#[derive(Debug, Default)]
pub struct ConversationStore {
    logs: HashMap<Username, Vec<ChatMessage>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message the local user sent to `peer`. Callers append only
    /// after the transport accepted the frame, so a failed send never leaves
    /// a ghost entry.
    pub fn append_outgoing(&mut self, peer: &str, message: ChatMessage) {
        self.append(peer, message);
    }

    /// Records a message received from `peer`.
    pub fn append_incoming(&mut self, peer: &str, message: ChatMessage) {
        self.append(peer, message);
    }

    pub fn log_for(&self, peer: &str) -> &[ChatMessage] {
        self.logs.get(peer).map(Vec::as_slice).unwrap_or_default()
    }

    /// Peers with at least one logged message, in no particular order.
    pub fn peers(&self) -> impl Iterator<Item = &Username> {
        self.logs.keys()
    }

    fn append(&mut self, peer: &str, message: ChatMessage) {
        self.logs.entry(peer.to_string()).or_default().push(message);
    }
}
