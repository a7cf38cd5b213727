mod common;

use chatterbox_rust::client::ClientError;
use chatterbox_rust::types::events::CallPhase;
use chatterbox_core::call::{CallError, CallSlot};
use common::{connected_client, next_event};
use serde_json::json;

fn incoming_call_frame(call_id: &str, caller: &str) -> serde_json::Value {
    json!({
        "event": "incoming_call",
        "data": {"call_id": call_id, "caller": caller, "status": "calling"}
    })
}

#[tokio::test]
async fn callee_answers_and_hangs_up() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut incoming = client.event_bus.incoming_call.subscribe();
    let mut call_state = client.event_bus.call_state.subscribe();

    session.emit(incoming_call_frame("7", "bob")).await;
    let call = next_event(&mut incoming).await;
    assert_eq!(call.caller, "bob");

    // Accepting sends the intent but does not transition; the slot stays
    // Ringing until the server confirms.
    client.accept_call("7").await.unwrap();
    assert!(client.ringing_call().await.is_some());
    assert!(client.active_call().await.is_none());

    session
        .emit(json!({"event": "call_accepted", "data": {"call_id": "7", "status": "active"}}))
        .await;
    let update = next_event(&mut call_state).await;
    assert_eq!(update.phase, CallPhase::Accepted);
    let active = client.active_call().await.expect("call should be active");
    assert_eq!(active.caller, "bob");
    assert_eq!(active.call_id, "7");

    client.end_call("7").await.unwrap();
    assert_eq!(client.current_call().await, CallSlot::Idle);

    let frames = session.sent_frames().await;
    assert!(frames.iter().any(|f| f.contains("\"accept_call\"")));
    assert!(frames.iter().any(|f| f.contains("\"end_call\"")));
}

#[tokio::test]
async fn second_incoming_call_is_dropped() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut incoming = client.event_bus.incoming_call.subscribe();

    session.emit(incoming_call_frame("7", "bob")).await;
    next_event(&mut incoming).await;

    session.emit(incoming_call_frame("8", "carol")).await;

    // Prove the second call was processed (and dropped) by letting a later
    // event through, then checking the original record is untouched.
    let mut presence = client.event_bus.presence.subscribe();
    session
        .emit(json!({"event": "online_users", "data": {"users": ["bob", "carol"]}}))
        .await;
    next_event(&mut presence).await;

    let ringing = client.ringing_call().await.expect("still ringing");
    assert_eq!(ringing.call_id, "7");
    assert_eq!(ringing.caller, "bob");
}

#[tokio::test]
async fn accepting_an_unknown_call_is_a_noop() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut incoming = client.event_bus.incoming_call.subscribe();

    session.emit(incoming_call_frame("7", "bob")).await;
    next_event(&mut incoming).await;

    let err = client.accept_call("9").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Call(CallError::UnknownCall(ref id)) if id == "9"
    ));

    // No accept frame went out and the slot is unchanged.
    let frames = session.sent_frames().await;
    assert!(!frames.iter().any(|f| f.contains("\"accept_call\"")));
    assert_eq!(client.ringing_call().await.unwrap().call_id, "7");
}

#[tokio::test]
async fn caller_stays_idle_until_the_callee_joins() {
    let (client, _factory, session, _run) = connected_client("alice").await;

    client.initiate_call("bob").await.unwrap();
    let frames = session.sent_frames().await;
    assert!(frames.iter().any(|f| f.contains("\"initiate_voice_call\"")));

    // The server acks the dial; still no active call.
    session
        .emit(json!({
            "event": "call_initiated",
            "data": {"call_id": "42", "caller": "alice", "receiver": "bob", "status": "calling"}
        }))
        .await;

    // Nothing has confirmed the callee joined, so the slot must stay Idle
    // no matter how long we wait.
    let mut presence = client.event_bus.presence.subscribe();
    session
        .emit(json!({"event": "online_users", "data": {"users": ["bob"]}}))
        .await;
    next_event(&mut presence).await;
    assert_eq!(client.current_call().await, CallSlot::Idle);

    // Once the callee accepts, the caller becomes active.
    let mut call_state = client.event_bus.call_state.subscribe();
    session
        .emit(json!({"event": "call_accepted", "data": {"call_id": "42", "status": "active"}}))
        .await;
    let update = next_event(&mut call_state).await;
    assert_eq!(update.phase, CallPhase::Accepted);
    let active = client.active_call().await.unwrap();
    assert_eq!(active.caller, "alice");
    assert_eq!(active.receiver, "bob");
}

#[tokio::test]
async fn rejected_dial_returns_to_idle() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut call_state = client.event_bus.call_state.subscribe();

    client.initiate_call("bob").await.unwrap();
    session
        .emit(json!({
            "event": "call_initiated",
            "data": {"call_id": "42", "caller": "alice", "receiver": "bob", "status": "calling"}
        }))
        .await;
    session
        .emit(json!({"event": "call_rejected", "data": {"call_id": "42"}}))
        .await;

    let update = next_event(&mut call_state).await;
    assert_eq!(update.phase, CallPhase::Rejected);
    assert_eq!(client.current_call().await, CallSlot::Idle);

    // A stray acceptance afterwards no longer matches anything.
    let mut presence = client.event_bus.presence.subscribe();
    session
        .emit(json!({"event": "call_accepted", "data": {"call_id": "42"}}))
        .await;
    session
        .emit(json!({"event": "online_users", "data": {"users": ["bob"]}}))
        .await;
    next_event(&mut presence).await;
    assert_eq!(client.current_call().await, CallSlot::Idle);
}

#[tokio::test]
async fn local_reject_clears_the_slot_and_notifies_the_server() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut incoming = client.event_bus.incoming_call.subscribe();

    session.emit(incoming_call_frame("7", "bob")).await;
    next_event(&mut incoming).await;

    client.reject_call("7").await.unwrap();
    assert_eq!(client.current_call().await, CallSlot::Idle);

    let frames = session.sent_frames().await;
    assert!(frames.iter().any(|f| f.contains("\"reject_call\"")));
}

#[tokio::test]
async fn remote_hangup_clears_an_active_call() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut incoming = client.event_bus.incoming_call.subscribe();
    let mut call_state = client.event_bus.call_state.subscribe();

    session.emit(incoming_call_frame("7", "bob")).await;
    next_event(&mut incoming).await;
    session
        .emit(json!({"event": "call_accepted", "data": {"call_id": "7"}}))
        .await;
    next_event(&mut call_state).await;

    session
        .emit(json!({"event": "call_ended", "data": {"call_id": "7"}}))
        .await;
    let update = next_event(&mut call_state).await;
    assert_eq!(update.phase, CallPhase::Ended);
    assert_eq!(client.current_call().await, CallSlot::Idle);
}

#[tokio::test]
async fn ending_a_call_that_is_not_active_fails() {
    let (client, _factory, session, _run) = connected_client("alice").await;
    let mut incoming = client.event_bus.incoming_call.subscribe();

    session.emit(incoming_call_frame("7", "bob")).await;
    next_event(&mut incoming).await;

    // Ringing, not active: a local hang-up is refused.
    let err = client.end_call("7").await.unwrap_err();
    assert!(matches!(err, ClientError::Call(CallError::UnknownCall(_))));
    assert!(client.ringing_call().await.is_some());
}
