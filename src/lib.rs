// Re-export core modules for consumers of this crate
pub use chatterbox_core::{auth, call, conversation, net, presence, protocol};

// Core types are re-exported, but events (with EventBus) remain here for
// platform-specific functionality
pub mod types {
    pub use chatterbox_core::types::*;
    pub mod events;
}

// Platform-specific modules remain here
pub mod client;
pub mod config;
pub mod store;
pub mod transport;
