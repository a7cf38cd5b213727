use chatterbox_core::types::Username;
use chatterbox_core::types::call::CallInfo;
use chatterbox_core::types::message::ChatMessage;
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// The connection is up and the local identity has been announced.
#[derive(Debug, Clone)]
pub struct Connected {}

#[derive(Debug, Clone)]
pub struct Disconnected {
    /// Whether the client will keep retrying on its own. `false` means the
    /// reconnect budget is spent (or the disconnect was intentional) and a
    /// manual `run` is needed to get back online.
    pub will_retry: bool,
}

/// The authoritative set of other online users, after a snapshot or status
/// change was applied.
#[derive(Debug, Clone)]
pub struct PresenceUpdate {
    pub online_users: Vec<Username>,
}

/// A message (text or file) arrived and was appended to `peer`'s log.
#[derive(Debug, Clone)]
pub struct MessageReceived {
    pub peer: Username,
    pub message: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct TypingUpdate {
    pub username: Username,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Accepted,
    Rejected,
    Ended,
}

/// A call left the ringing/dialing stage, one way or another.
#[derive(Debug, Clone)]
pub struct CallStateUpdate {
    pub call: CallInfo,
    pub phase: CallPhase,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus that provides separate broadcast channels for each
        /// event type the UI layer can react to.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connected, Arc<Connected>),
    (disconnected, Arc<Disconnected>),

    // Domain events
    (presence, Arc<PresenceUpdate>),
    (message, Arc<MessageReceived>),
    (typing, Arc<TypingUpdate>),

    // Call signaling events
    (incoming_call, Arc<CallInfo>),
    (call_state, Arc<CallStateUpdate>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
