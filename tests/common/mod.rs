//! Shared test doubles: an in-memory transport that records outbound frames
//! and lets tests inject server events, plus helpers to bring a client up.

// Each test binary compiles its own copy and uses a different subset.
#![allow(dead_code)]

use async_trait::async_trait;
use chatterbox_core::net::{Transport, TransportEvent, TransportFactory};
use chatterbox_rust::client::Client;
use chatterbox_rust::config::ClientConfig;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const EVENT_WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, frame: &str) -> Result<(), anyhow::Error> {
        self.sent.lock().await.push(frame.to_string());
        Ok(())
    }

    async fn disconnect(&self) {}
}

/// Handles for one mock connection: inject server frames through `events`,
/// inspect what the client sent through `transport`.
pub struct MockSession {
    pub transport: Arc<MockTransport>,
    pub events: mpsc::Sender<TransportEvent>,
}

impl MockSession {
    /// Injects one server frame, as the JSON value the server would send.
    pub async fn emit(&self, frame: serde_json::Value) {
        self.events
            .send(TransportEvent::TextReceived(frame.to_string()))
            .await
            .expect("client stopped consuming transport events");
    }

    pub async fn emit_raw(&self, frame: &str) {
        self.events
            .send(TransportEvent::TextReceived(frame.to_string()))
            .await
            .expect("client stopped consuming transport events");
    }

    /// Simulates the server dropping the connection.
    pub async fn drop_connection(&self) {
        let _ = self.events.send(TransportEvent::Disconnected).await;
    }

    pub async fn sent_frames(&self) -> Vec<String> {
        self.transport.sent.lock().await.clone()
    }
}

/// Factory that hands out pre-queued sessions, one per connect attempt.
/// A connect attempt with nothing queued fails, which is how tests exercise
/// the bounded-reconnect path.
#[derive(Default)]
pub struct MockTransportFactory {
    queue: Mutex<VecDeque<(Arc<MockTransport>, mpsc::Receiver<TransportEvent>)>>,
}

impl MockTransportFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push_session(&self) -> MockSession {
        let (event_tx, event_rx) = mpsc::channel(64);
        let transport = Arc::new(MockTransport::default());
        self.queue
            .lock()
            .await
            .push_back((transport.clone(), event_rx));
        MockSession {
            transport,
            events: event_tx,
        }
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let (transport, event_rx) = self
            .queue
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no session available"))?;
        Ok((transport, event_rx))
    }
}

pub fn test_config() -> ClientConfig {
    ClientConfig {
        server_url: "ws://mock.invalid/ws".to_string(),
        reconnect_attempts: 5,
        reconnect_delay: Duration::from_millis(10),
    }
}

/// Spins up a client against a mock session and waits until it announced
/// itself online.
pub async fn connected_client(
    username: &str,
) -> (
    Arc<Client>,
    Arc<MockTransportFactory>,
    MockSession,
    JoinHandle<()>,
) {
    let _ = env_logger::builder().is_test(true).try_init();

    let factory = MockTransportFactory::new();
    let session = factory.push_session().await;
    let client = Client::new(username, test_config(), factory.clone());

    let mut connected = client.event_bus.connected.subscribe();
    let run_client = client.clone();
    let run_task = tokio::spawn(async move { run_client.run().await });

    timeout(EVENT_WAIT, connected.recv())
        .await
        .expect("timed out waiting for connect")
        .expect("connected channel closed");

    (client, factory, session, run_task)
}

/// Waits for one value on a broadcast receiver, with a timeout so a missed
/// event fails the test instead of hanging it.
pub async fn next_event<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> T {
    timeout(EVENT_WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}
