//! The session coordinator.
//!
//! [`Client`] owns the single server connection and every piece of session
//! state: the presence set, the per-peer conversation logs and the call
//! slot. Local intents are validated against the connection state and
//! forwarded to the transport; inbound events are decoded and routed to the
//! owning component. All domain transitions are synchronous; the only
//! suspension points are the transport boundary and the reconnect backoff.

use crate::config::ClientConfig;
use crate::transport::{Transport, TransportEvent, TransportFactory};
use crate::types::events::{
    CallPhase, CallStateUpdate, Connected, Disconnected, EventBus, MessageReceived, PresenceUpdate,
    TypingUpdate,
};
use bytes::Bytes;
use chatterbox_core::call::{CallError, CallSession, CallSlot};
use chatterbox_core::conversation::ConversationStore;
use chatterbox_core::presence::PresenceTracker;
use chatterbox_core::protocol::{self, ClientEvent, ServerEvent};
use chatterbox_core::types::call::CallInfo;
use chatterbox_core::types::message::{
    ChatMessage, FileAttachment, MAX_ATTACHMENT_BYTES, MessageContent,
};
use chatterbox_core::types::{ConnectionState, Username};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock, mpsc};
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("attachment is {size} bytes, above the 10 MiB transfer limit")]
    AttachmentTooLarge { size: u64 },
    #[error("call signaling error: {0}")]
    Call(#[from] CallError),
    #[error("transport error: {0}")]
    Transport(anyhow::Error),
}

pub struct Client {
    username: Username,
    config: ClientConfig,

    presence: RwLock<PresenceTracker>,
    conversations: RwLock<ConversationStore>,
    call: Mutex<CallSession>,

    is_connected: AtomicBool,
    is_connecting: AtomicBool,
    is_running: AtomicBool,
    shutdown_notifier: Notify,

    transport: Mutex<Option<Arc<dyn Transport>>>,
    transport_events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    transport_factory: Arc<dyn TransportFactory>,

    pub event_bus: EventBus,

    pub enable_auto_reconnect: AtomicBool,
    auto_reconnect_errors: AtomicU32,
}

impl Client {
    pub fn new(
        username: impl Into<Username>,
        config: ClientConfig,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Arc<Self> {
        let username = username.into();
        Arc::new(Self {
            presence: RwLock::new(PresenceTracker::new(username.clone())),
            conversations: RwLock::new(ConversationStore::new()),
            call: Mutex::new(CallSession::new(username.clone())),
            username,
            config,

            is_connected: AtomicBool::new(false),
            is_connecting: AtomicBool::new(false),
            is_running: AtomicBool::new(false),
            shutdown_notifier: Notify::new(),

            transport: Mutex::new(None),
            transport_events: Mutex::new(None),
            transport_factory,

            event_bus: EventBus::new(),

            enable_auto_reconnect: AtomicBool::new(true),
            auto_reconnect_errors: AtomicU32::new(0),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.is_connecting.load(Ordering::Relaxed) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Connects and processes events until the client is shut down or the
    /// reconnect budget is spent. Reconnection uses a fixed delay and a
    /// bounded attempt count; conversations and the call slot survive a
    /// transient drop, only presence is discarded.
    pub async fn run(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Client `run` method called while already running.");
            return;
        }
        self.auto_reconnect_errors.store(0, Ordering::Relaxed);

        while self.is_running.load(Ordering::Relaxed) {
            match self.connect().await {
                Ok(()) => {
                    self.auto_reconnect_errors.store(0, Ordering::Relaxed);
                    if let Err(e) = self.read_events_loop().await {
                        warn!(target: "Client", "Event loop exited with an error: {e:?}");
                    }
                }
                Err(e) => {
                    error!(target: "Client", "Failed to connect: {e:?}");
                }
            }
            self.cleanup_connection_state().await;

            if !self.is_running.load(Ordering::Relaxed) {
                // Intentional disconnect; `disconnect` already notified.
                break;
            }

            let attempt = self.auto_reconnect_errors.fetch_add(1, Ordering::SeqCst) + 1;
            let will_retry = self.enable_auto_reconnect.load(Ordering::Relaxed)
                && attempt <= self.config.reconnect_attempts;
            let _ = self
                .event_bus
                .disconnected
                .send(Arc::new(Disconnected { will_retry }));

            if !will_retry {
                warn!(
                    target: "Client",
                    "Giving up after {} reconnect attempts; staying offline.",
                    self.config.reconnect_attempts
                );
                self.is_running.store(false, Ordering::Relaxed);
                break;
            }

            info!(
                target: "Client",
                "Will attempt to reconnect in {:?} (attempt {attempt} of {})",
                self.config.reconnect_delay,
                self.config.reconnect_attempts
            );
            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown_notifier.notified() => break,
            }
        }
        info!(target: "Client", "Client run loop has shut down.");
        self.is_running.store(false, Ordering::Relaxed);
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.is_connecting.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }
        let _guard = scopeguard::guard((), |_| {
            self.is_connecting.store(false, Ordering::Relaxed);
        });

        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }

        info!(target: "Client", "Connecting to {}", self.config.server_url);
        let (transport, transport_events) = self
            .transport_factory
            .create_transport()
            .await
            .map_err(ClientError::Transport)?;

        *self.transport.lock().await = Some(transport);
        *self.transport_events.lock().await = Some(transport_events);
        self.is_connected.store(true, Ordering::Relaxed);

        // The server tracks liveness per socket, not per account, so the
        // identity must be re-announced on every (re)connect before presence
        // means anything.
        self.announce_online().await?;
        let _ = self.event_bus.connected.send(Arc::new(Connected {}));
        Ok(())
    }

    /// Intentionally closes the connection and stops the run loop.
    pub async fn disconnect(&self) {
        info!(target: "Client", "Disconnecting client intentionally.");
        self.is_running.store(false, Ordering::Relaxed);
        self.shutdown_notifier.notify_waiters();

        if let Some(transport) = self.transport.lock().await.as_ref() {
            transport.disconnect().await;
        }
        self.cleanup_connection_state().await;
        let _ = self
            .event_bus
            .disconnected
            .send(Arc::new(Disconnected { will_retry: false }));
    }

    async fn cleanup_connection_state(&self) {
        self.is_connected.store(false, Ordering::Relaxed);
        *self.transport.lock().await = None;
        *self.transport_events.lock().await = None;
        // Conversations and any in-flight call survive a transient drop;
        // presence is only meaningful while the server can see us.
        self.presence.write().await.clear();
    }

    async fn read_events_loop(self: &Arc<Self>) -> Result<(), anyhow::Error> {
        info!(target: "Client", "Starting event processing loop...");

        let mut rx_guard = self.transport_events.lock().await;
        let mut transport_events = rx_guard
            .take()
            .ok_or_else(|| anyhow::anyhow!("cannot start event loop: not connected"))?;
        drop(rx_guard);

        loop {
            if !self.is_running.load(Ordering::Relaxed) {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = self.shutdown_notifier.notified() => {
                    info!(target: "Client", "Shutdown signaled in event loop.");
                    return Ok(());
                }
                event = transport_events.recv() => {
                    match event {
                        Some(TransportEvent::TextReceived(frame)) => self.handle_frame(&frame).await,
                        Some(TransportEvent::Connected) => {
                            debug!(target: "Client", "Transport reports connected")
                        }
                        Some(TransportEvent::Disconnected) => {
                            return Err(anyhow::anyhow!("connection lost"));
                        }
                        None => {
                            return Err(anyhow::anyhow!("transport event channel closed"));
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, frame: &str) {
        let event = match protocol::decode_server_event(frame) {
            Ok(event) => event,
            Err(e) => {
                // Unknown or malformed events are dropped, never fatal.
                warn!(target: "Client/Recv", "Ignoring undecodable frame: {e}");
                return;
            }
        };
        self.handle_server_event(event).await;
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::OnlineUsers { users } => {
                self.presence.write().await.apply_snapshot(users);
                self.emit_presence().await;
            }
            ServerEvent::UserStatusChanged {
                username,
                status,
                online_users,
            } => {
                debug!(target: "Client/Recv", "{username} is now {status}");
                self.presence.write().await.apply_delta(online_users);
                self.emit_presence().await;
            }
            ServerEvent::PrivateMessage {
                sender,
                receiver,
                message,
                timestamp,
            } => {
                let message = ChatMessage {
                    sender: sender.clone(),
                    receiver,
                    content: MessageContent::Text(message),
                    timestamp: protocol::parse_timestamp(&timestamp),
                };
                self.conversations
                    .write()
                    .await
                    .append_incoming(&sender, message.clone());
                let _ = self
                    .event_bus
                    .message
                    .send(Arc::new(MessageReceived {
                        peer: sender,
                        message,
                    }));
            }
            ServerEvent::FileReceived {
                sender,
                receiver,
                file_name,
                file_size,
                file_data,
                timestamp,
            } => {
                let data = match protocol::decode_attachment(&file_data) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!(target: "Client/Recv", "Dropping file from {sender}: {e}");
                        return;
                    }
                };
                let file_size = if file_size == 0 {
                    data.len() as u64
                } else {
                    file_size
                };
                let message = ChatMessage {
                    sender: sender.clone(),
                    receiver,
                    content: MessageContent::File(FileAttachment {
                        file_name,
                        file_size,
                        data,
                    }),
                    timestamp: protocol::parse_timestamp(&timestamp),
                };
                self.conversations
                    .write()
                    .await
                    .append_incoming(&sender, message.clone());
                let _ = self
                    .event_bus
                    .message
                    .send(Arc::new(MessageReceived {
                        peer: sender,
                        message,
                    }));
            }
            ServerEvent::IncomingCall {
                call_id,
                caller,
                receiver,
            } => {
                let receiver = if receiver.is_empty() {
                    self.username.clone()
                } else {
                    receiver
                };
                let info = CallInfo {
                    call_id,
                    caller,
                    receiver,
                };
                match self.call.lock().await.ring(info) {
                    Ok(info) => {
                        info!(
                            target: "Client/Call",
                            "Incoming call {} from {}", info.call_id, info.caller
                        );
                        let _ = self.event_bus.incoming_call.send(Arc::new(info));
                    }
                    Err(CallError::Conflict) => {
                        warn!(
                            target: "Client/Call",
                            "Dropping incoming call notification: another call is in progress"
                        );
                    }
                    Err(e) => warn!(target: "Client/Call", "Incoming call ignored: {e}"),
                }
            }
            ServerEvent::CallAccepted { call_id } | ServerEvent::CallStarted { call_id } => {
                match self.call.lock().await.remote_accepted(&call_id) {
                    Ok(info) => {
                        info!(target: "Client/Call", "Call {} is now active", info.call_id);
                        let _ = self.event_bus.call_state.send(Arc::new(CallStateUpdate {
                            call: info,
                            phase: CallPhase::Accepted,
                        }));
                    }
                    Err(e) => debug!(target: "Client/Call", "Ignoring call acceptance: {e}"),
                }
            }
            ServerEvent::CallRejected { call_id } => {
                match self.call.lock().await.remote_rejected(&call_id) {
                    Ok(info) => {
                        info!(target: "Client/Call", "Call {} was rejected", info.call_id);
                        let _ = self.event_bus.call_state.send(Arc::new(CallStateUpdate {
                            call: info,
                            phase: CallPhase::Rejected,
                        }));
                    }
                    Err(e) => debug!(target: "Client/Call", "Ignoring call rejection: {e}"),
                }
            }
            ServerEvent::CallEnded { call_id } => {
                match self.call.lock().await.remote_ended(&call_id) {
                    Ok(info) => {
                        info!(target: "Client/Call", "Call {} ended", info.call_id);
                        let _ = self.event_bus.call_state.send(Arc::new(CallStateUpdate {
                            call: info,
                            phase: CallPhase::Ended,
                        }));
                    }
                    Err(e) => debug!(target: "Client/Call", "Ignoring call end: {e}"),
                }
            }
            ServerEvent::CallInitiated {
                call_id,
                caller,
                receiver,
            } => {
                debug!(
                    target: "Client/Call",
                    "Server registered call {call_id} ({caller} -> {receiver})"
                );
                self.call.lock().await.dial_confirmed(&call_id);
            }
            ServerEvent::ConnectionResponse {
                success, message, ..
            } => {
                info!(target: "Client", "Server greeting (success={success}): {message}");
            }
            ServerEvent::MessageSent { success, receiver } => {
                // Best-effort delivery: the ack is informational only.
                debug!(
                    target: "Client/Recv",
                    "Server ack for message to {receiver} (success={success})"
                );
            }
            ServerEvent::FileSent {
                success,
                file_name,
                receiver,
            } => {
                debug!(
                    target: "Client/Recv",
                    "Server ack for file {file_name} to {receiver} (success={success})"
                );
            }
            ServerEvent::UserTyping { username, is_typing } => {
                let _ = self
                    .event_bus
                    .typing
                    .send(Arc::new(TypingUpdate { username, is_typing }));
            }
            ServerEvent::Error { message } => {
                warn!(target: "Client/Recv", "Server error: {message}");
            }
        }
    }

    async fn emit_presence(&self) {
        let online_users = self.online_users().await;
        let _ = self
            .event_bus
            .presence
            .send(Arc::new(PresenceUpdate { online_users }));
    }

    async fn announce_online(&self) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::UserOnline {
            username: self.username.clone(),
        })
        .await?;
        self.send_event(&ClientEvent::GetOnlineUsers {}).await
    }

    async fn send_event(&self, event: &ClientEvent) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let frame =
            protocol::encode_client_event(event).map_err(|e| ClientError::Transport(e.into()))?;
        let transport = self
            .transport
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(ClientError::NotConnected)?;
        transport
            .send_text(&frame)
            .await
            .map_err(ClientError::Transport)
    }

    /// Sends a text message. The log entry is only appended once the
    /// transport accepted the frame, so a failed send leaves no ghost
    /// message; there is no automatic retry.
    pub async fn send_message(&self, receiver: &str, text: &str) -> Result<(), ClientError> {
        let timestamp = Utc::now();
        self.send_event(&ClientEvent::PrivateMessage {
            sender: self.username.clone(),
            receiver: receiver.to_string(),
            message: text.to_string(),
            timestamp: timestamp.to_rfc3339(),
        })
        .await?;

        let message = ChatMessage {
            sender: self.username.clone(),
            receiver: receiver.to_string(),
            content: MessageContent::Text(text.to_string()),
            timestamp,
        };
        self.conversations
            .write()
            .await
            .append_outgoing(receiver, message);
        Ok(())
    }

    /// Sends a file attachment. The payload travels base64-encoded inside
    /// the same event stream as everything else.
    pub async fn send_file(
        &self,
        receiver: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<(), ClientError> {
        let size = data.len() as u64;
        if size > MAX_ATTACHMENT_BYTES {
            return Err(ClientError::AttachmentTooLarge { size });
        }

        let timestamp = Utc::now();
        self.send_event(&ClientEvent::FileTransfer {
            sender: self.username.clone(),
            receiver: receiver.to_string(),
            file_name: file_name.to_string(),
            file_size: size,
            file_data: protocol::encode_attachment(&data),
        })
        .await?;

        let message = ChatMessage {
            sender: self.username.clone(),
            receiver: receiver.to_string(),
            content: MessageContent::File(FileAttachment {
                file_name: file_name.to_string(),
                file_size: size,
                data,
            }),
            timestamp,
        };
        self.conversations
            .write()
            .await
            .append_outgoing(receiver, message);
        Ok(())
    }

    /// Asks the server for a fresh presence snapshot.
    pub async fn request_online_users(&self) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::GetOnlineUsers {}).await
    }

    pub async fn send_typing(&self, receiver: &str, is_typing: bool) -> Result<(), ClientError> {
        self.send_event(&ClientEvent::Typing {
            sender: self.username.clone(),
            receiver: receiver.to_string(),
            is_typing,
        })
        .await
    }

    /// Dials `receiver`. The local slot stays Idle until the callee's
    /// acceptance comes back from the server.
    pub async fn initiate_call(&self, receiver: &str) -> Result<(), ClientError> {
        self.call.lock().await.begin_dial(receiver)?;

        let result = self
            .send_event(&ClientEvent::InitiateVoiceCall {
                caller: self.username.clone(),
                receiver: receiver.to_string(),
            })
            .await;
        if result.is_err() {
            // The server never saw the dial; forget it locally too.
            self.call.lock().await.cancel_dial();
        }
        result
    }

    /// Accepts the ringing call. The slot stays Ringing until the server
    /// confirms with `call_accepted`, so caller and callee converge on the
    /// same state.
    pub async fn accept_call(&self, call_id: &str) -> Result<(), ClientError> {
        self.call.lock().await.accept_target(call_id)?;
        self.send_event(&ClientEvent::AcceptCall {
            call_id: call_id.to_string(),
            username: self.username.clone(),
        })
        .await
    }

    /// Declines the ringing call and clears the slot.
    pub async fn reject_call(&self, call_id: &str) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let info = self.call.lock().await.reject_local(call_id)?;
        info!(target: "Client/Call", "Rejected call {}", info.call_id);
        self.send_event(&ClientEvent::RejectCall {
            call_id: call_id.to_string(),
        })
        .await?;
        let _ = self.event_bus.call_state.send(Arc::new(CallStateUpdate {
            call: info,
            phase: CallPhase::Rejected,
        }));
        Ok(())
    }

    /// Hangs up the active call and clears the slot.
    pub async fn end_call(&self, call_id: &str) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let info = self.call.lock().await.end_local(call_id)?;
        info!(target: "Client/Call", "Ended call {}", info.call_id);
        self.send_event(&ClientEvent::EndCall {
            call_id: call_id.to_string(),
            username: self.username.clone(),
        })
        .await?;
        let _ = self.event_bus.call_state.send(Arc::new(CallStateUpdate {
            call: info,
            phase: CallPhase::Ended,
        }));
        Ok(())
    }

    /// The other users currently online, sorted for stable display.
    pub async fn online_users(&self) -> Vec<Username> {
        let presence = self.presence.read().await;
        let mut users: Vec<Username> = presence.current().iter().cloned().collect();
        users.sort_unstable();
        users
    }

    /// A copy of the conversation log with `peer`.
    pub async fn messages_with(&self, peer: &str) -> Vec<ChatMessage> {
        self.conversations.read().await.log_for(peer).to_vec()
    }

    /// Peers with at least one logged message.
    pub async fn conversation_peers(&self) -> Vec<Username> {
        let conversations = self.conversations.read().await;
        let mut peers: Vec<Username> = conversations.peers().cloned().collect();
        peers.sort_unstable();
        peers
    }

    pub async fn current_call(&self) -> CallSlot {
        self.call.lock().await.slot().clone()
    }

    pub async fn ringing_call(&self) -> Option<CallInfo> {
        self.call.lock().await.ringing().cloned()
    }

    pub async fn active_call(&self) -> Option<CallInfo> {
        self.call.lock().await.active().cloned()
    }
}
