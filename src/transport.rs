pub use chatterbox_core::net::{Transport, TransportEvent, TransportFactory};
pub use chatterbox_rust_tokio_transport::{TokioWebSocketTransport, TokioWebSocketTransportFactory};
