//! Wire protocol for the ChatterBox server.
//!
//! Every frame is a JSON text envelope `{"event": <name>, "data": {...}}`.
//! Inbound frames decode into the closed [`ServerEvent`] union so dispatch is
//! exhaustive; outbound intents encode from [`ClientEvent`]. A frame that
//! fails to decode is reported as a [`ProtocolError`] and dropped by the
//! caller, never treated as fatal.

use crate::types::Username;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid file data: {0}")]
    FileData(#[from] base64::DecodeError),
}

/// Everything the server can push to the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full presence snapshot, sent after `user_online` or on request.
    OnlineUsers { users: Vec<Username> },
    /// Broadcast whenever anyone joins or leaves. Despite the name it
    /// carries the full authoritative membership, not a diff.
    UserStatusChanged {
        #[serde(default)]
        username: Username,
        #[serde(default)]
        status: String,
        online_users: Vec<Username>,
    },
    PrivateMessage {
        sender: Username,
        receiver: Username,
        message: String,
        #[serde(default)]
        timestamp: String,
    },
    FileReceived {
        sender: Username,
        receiver: Username,
        file_name: String,
        #[serde(default)]
        file_size: u64,
        file_data: String,
        #[serde(default)]
        timestamp: String,
    },
    IncomingCall {
        call_id: String,
        caller: Username,
        #[serde(default)]
        receiver: Username,
    },
    /// Caller-side confirmation that the callee joined.
    CallAccepted { call_id: String },
    /// Callee-side confirmation after sending `accept_call`.
    CallStarted { call_id: String },
    CallRejected { call_id: String },
    CallEnded { call_id: String },
    /// Server ack for `initiate_voice_call`, carrying the minted call id.
    CallInitiated {
        call_id: String,
        #[serde(default)]
        caller: Username,
        #[serde(default)]
        receiver: Username,
    },
    /// Greeting emitted by the server right after the socket opens.
    ConnectionResponse {
        success: bool,
        #[serde(default)]
        message: String,
        #[serde(default)]
        socket_id: String,
    },
    MessageSent {
        success: bool,
        #[serde(default)]
        receiver: Username,
    },
    FileSent {
        success: bool,
        #[serde(default)]
        file_name: String,
        #[serde(default)]
        receiver: Username,
    },
    UserTyping {
        username: Username,
        #[serde(default)]
        is_typing: bool,
    },
    Error { message: String },
}

/// Everything the client can send to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    UserOnline {
        username: Username,
    },
    GetOnlineUsers {},
    PrivateMessage {
        sender: Username,
        receiver: Username,
        message: String,
        timestamp: String,
    },
    FileTransfer {
        sender: Username,
        receiver: Username,
        file_name: String,
        file_size: u64,
        file_data: String,
    },
    InitiateVoiceCall {
        caller: Username,
        receiver: Username,
    },
    AcceptCall {
        call_id: String,
        username: Username,
    },
    RejectCall {
        call_id: String,
    },
    EndCall {
        call_id: String,
        username: Username,
    },
    Typing {
        sender: Username,
        receiver: Username,
        is_typing: bool,
    },
}

pub fn decode_server_event(frame: &str) -> Result<ServerEvent, ProtocolError> {
    Ok(serde_json::from_str(frame)?)
}

pub fn encode_client_event(event: &ClientEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

pub fn encode_attachment(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn decode_attachment(file_data: &str) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(BASE64.decode(file_data)?))
}

/// Parses the timestamps the server and peers put on the wire. Peers send
/// RFC 3339 with an offset, the server sends naive ISO 8601 local time;
/// anything unparseable falls back to the time of receipt.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        return naive.and_utc();
    }
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_presence_snapshot() {
        let frame = r#"{"event":"online_users","data":{"users":["alice","bob"]}}"#;
        match decode_server_event(frame).unwrap() {
            ServerEvent::OnlineUsers { users } => assert_eq!(users, vec!["alice", "bob"]),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_status_change_with_extra_fields() {
        let frame = r#"{"event":"user_status_changed","data":{"username":"carol","status":"offline","online_users":["alice"]}}"#;
        match decode_server_event(frame).unwrap() {
            ServerEvent::UserStatusChanged {
                username,
                status,
                online_users,
            } => {
                assert_eq!(username, "carol");
                assert_eq!(status, "offline");
                assert_eq!(online_users, vec!["alice"]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_name_is_an_error() {
        let frame = r#"{"event":"udp_registration_ready","data":{"udp_port":5001}}"#;
        assert!(decode_server_event(frame).is_err());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let frame = r#"{"event":"private_message","data":{"sender":42}}"#;
        assert!(decode_server_event(frame).is_err());
    }

    #[test]
    fn encodes_accept_call_envelope() {
        let event = ClientEvent::AcceptCall {
            call_id: "c-7".into(),
            username: "alice".into(),
        };
        let frame = encode_client_event(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "accept_call");
        assert_eq!(value["data"]["call_id"], "c-7");
        assert_eq!(value["data"]["username"], "alice");
    }

    #[test]
    fn parses_offset_and_naive_timestamps() {
        let with_offset = parse_timestamp("2025-06-01T12:00:00.000Z");
        assert_eq!(with_offset.to_rfc3339(), "2025-06-01T12:00:00+00:00");

        // The server stamps file messages with naive local time.
        let naive = parse_timestamp("2025-06-01T12:00:00.123456");
        assert_eq!(naive.timestamp(), with_offset.timestamp());
    }

    #[test]
    fn attachment_decode_rejects_invalid_base64() {
        assert!(decode_attachment("not base64!!").is_err());
        let decoded = decode_attachment(&encode_attachment(b"hello")).unwrap();
        assert_eq!(&decoded[..], b"hello");
    }
}
