pub mod call;
pub mod message;

/// A user-facing account name. The server guarantees uniqueness among
/// connected sessions; the client treats it as an opaque key.
pub type Username = String;

/// Lifecycle of the single server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}
