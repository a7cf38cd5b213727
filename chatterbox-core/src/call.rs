//! Voice-call signaling state machine.
//!
//! A client holds exactly one call slot: `Idle`, `Ringing` (incoming, not
//! yet answered) or `Active`. Signaling is deliberately asymmetric: the
//! callee stays `Ringing` after sending its accept and both sides only move
//! to `Active` on the server's confirmation, so neither party believes a
//! call is live before the other has actually joined. An outgoing dial is
//! tracked separately and leaves the slot `Idle` until `call_accepted`
//! arrives.

use crate::types::Username;
use crate::types::call::CallInfo;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// A call is already ringing or active; the new one is discarded.
    #[error("another call is already in progress")]
    Conflict,
    /// The referenced call id is not held locally.
    #[error("unknown call id: {0}")]
    UnknownCall(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallSlot {
    #[default]
    Idle,
    Ringing(CallInfo),
    Active(CallInfo),
}

#[derive(Debug, Clone)]
struct PendingDial {
    peer: Username,
    /// Filled in once the server acks the dial with `call_initiated`.
    call_id: Option<String>,
}

#[derive(Debug)]
pub struct CallSession {
    local_user: Username,
    slot: CallSlot,
    pending_dial: Option<PendingDial>,
}

impl CallSession {
    pub fn new(local_user: impl Into<Username>) -> Self {
        Self {
            local_user: local_user.into(),
            slot: CallSlot::Idle,
            pending_dial: None,
        }
    }

    pub fn slot(&self) -> &CallSlot {
        &self.slot
    }

    pub fn ringing(&self) -> Option<&CallInfo> {
        match &self.slot {
            CallSlot::Ringing(info) => Some(info),
            _ => None,
        }
    }

    pub fn active(&self) -> Option<&CallInfo> {
        match &self.slot {
            CallSlot::Active(info) => Some(info),
            _ => None,
        }
    }

    /// Starts an outgoing dial to `peer`. The slot stays `Idle`; the caller
    /// only becomes `Active` once the callee's acceptance is confirmed by
    /// the server. Redialing while a previous dial is unanswered simply
    /// replaces it, matching what the server does with a fresh call id.
    pub fn begin_dial(&mut self, peer: &str) -> Result<(), CallError> {
        if self.slot != CallSlot::Idle {
            return Err(CallError::Conflict);
        }
        self.pending_dial = Some(PendingDial {
            peer: peer.to_string(),
            call_id: None,
        });
        Ok(())
    }

    /// Records the server-minted id for the pending dial (`call_initiated`).
    pub fn dial_confirmed(&mut self, call_id: &str) {
        if let Some(pending) = self.pending_dial.as_mut() {
            pending.call_id = Some(call_id.to_string());
        }
    }

    /// Forgets an outgoing dial the server never saw (transport send failed).
    pub fn cancel_dial(&mut self) {
        self.pending_dial = None;
    }

    /// Handles a remote `incoming_call`. Only an `Idle` slot starts ringing;
    /// while another call is ringing or active the new notification is
    /// discarded and the in-progress call record is left untouched.
    pub fn ring(&mut self, info: CallInfo) -> Result<CallInfo, CallError> {
        if self.slot != CallSlot::Idle {
            return Err(CallError::Conflict);
        }
        self.slot = CallSlot::Ringing(info.clone());
        Ok(info)
    }

    /// Validates that `call_id` names the currently ringing call, without
    /// transitioning. The callee sends `accept_call` after this and moves to
    /// `Active` only when the server confirms.
    pub fn accept_target(&self, call_id: &str) -> Result<CallInfo, CallError> {
        match &self.slot {
            CallSlot::Ringing(info) if info.call_id == call_id => Ok(info.clone()),
            _ => Err(CallError::UnknownCall(call_id.to_string())),
        }
    }

    /// Handles the server's `call_accepted`/`call_started` confirmation.
    /// The ringing callee and the dialing caller both converge on `Active`
    /// here. A caller whose `call_initiated` ack was lost still matches its
    /// pending dial by peer.
    pub fn remote_accepted(&mut self, call_id: &str) -> Result<CallInfo, CallError> {
        match &self.slot {
            CallSlot::Ringing(info) if info.call_id == call_id => {
                let info = info.clone();
                self.slot = CallSlot::Active(info.clone());
                self.pending_dial = None;
                Ok(info)
            }
            CallSlot::Active(info) if info.call_id == call_id => Ok(info.clone()),
            CallSlot::Idle => match self.take_dial(call_id) {
                Some(info) => {
                    self.slot = CallSlot::Active(info.clone());
                    Ok(info)
                }
                None => Err(CallError::UnknownCall(call_id.to_string())),
            },
            _ => Err(CallError::UnknownCall(call_id.to_string())),
        }
    }

    /// Local reject of the ringing call (or of an active one, for symmetry
    /// with the remote event). Clears the slot.
    pub fn reject_local(&mut self, call_id: &str) -> Result<CallInfo, CallError> {
        self.take_matching(call_id, true)
    }

    /// Remote `call_rejected`: the callee declined. Clears the slot, or the
    /// pending dial when we were the caller.
    pub fn remote_rejected(&mut self, call_id: &str) -> Result<CallInfo, CallError> {
        self.take_matching(call_id, true)
    }

    /// Local hang-up. Only an active call can be ended.
    pub fn end_local(&mut self, call_id: &str) -> Result<CallInfo, CallError> {
        self.take_matching(call_id, false)
    }

    /// Remote `call_ended`. The server notifies both parties, so this also
    /// covers a caller hanging up before the callee answered.
    pub fn remote_ended(&mut self, call_id: &str) -> Result<CallInfo, CallError> {
        self.take_matching(call_id, true)
    }

    fn dial_matches(&self, call_id: &str) -> bool {
        match &self.pending_dial {
            Some(PendingDial {
                call_id: Some(id), ..
            }) => id == call_id,
            // The id was never confirmed; assume the acceptance is for our
            // one outstanding dial.
            Some(PendingDial { call_id: None, .. }) => true,
            None => false,
        }
    }

    /// Clears the slot (and any matching pending dial) if `call_id` matches,
    /// returning the cleared record. `allow_ringing` gates whether a ringing
    /// call may be torn down (true for reject/remote-end, false for a local
    /// hang-up which requires an active call).
    fn take_matching(&mut self, call_id: &str, allow_ringing: bool) -> Result<CallInfo, CallError> {
        let matches = match &self.slot {
            CallSlot::Ringing(info) => allow_ringing && info.call_id == call_id,
            CallSlot::Active(info) => info.call_id == call_id,
            CallSlot::Idle => false,
        };
        if matches {
            let info = match std::mem::take(&mut self.slot) {
                CallSlot::Ringing(info) | CallSlot::Active(info) => info,
                CallSlot::Idle => unreachable!(),
            };
            return Ok(info);
        }
        self.take_dial(call_id)
            .ok_or_else(|| CallError::UnknownCall(call_id.to_string()))
    }

    /// Consumes the pending dial if `call_id` refers to it, materializing a
    /// call record for the caller side.
    fn take_dial(&mut self, call_id: &str) -> Option<CallInfo> {
        if !self.dial_matches(call_id) {
            return None;
        }
        self.pending_dial.take().map(|pending| CallInfo {
            call_id: call_id.to_string(),
            caller: self.local_user.clone(),
            receiver: pending.peer,
        })
    }
}
