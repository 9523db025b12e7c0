//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Wire payloads exchanged with the messaging substrate.
//!
//! Every payload carries `version: 0` and `call_id`. Descriptions and
//! candidates are serialized as plain fields, copies of the media stack's
//! values, never the media stack's own wrapper types, so that forwarding a
//! payload never leaks an engine-specific object onto the wire.

use serde::{Deserialize, Serialize};

use crate::common::CallId;

/// The signalling protocol version this crate speaks.
pub const VERSION: u32 = 0;

/// An SDP session description, copied out of whatever the media provider
/// returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A single trickled ICE candidate, in the shape `call.candidates` batches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateSdp {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InviteContent {
    pub version: u32,
    pub call_id: CallId,
    pub offer: SessionDescription,
    pub lifetime: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnswerContent {
    pub version: u32,
    pub call_id: CallId,
    pub answer: SessionDescription,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CandidatesContent {
    pub version: u32,
    pub call_id: CallId,
    pub candidates: Vec<IceCandidateSdp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HangupContent {
    pub version: u32,
    pub call_id: CallId,
    pub reason: String,
}

/// The four signalling events this crate publishes and consumes.
#[derive(Clone, Debug)]
pub enum SignalPayload {
    Invite(InviteContent),
    Answer(AnswerContent),
    Candidates(CandidatesContent),
    Hangup(HangupContent),
}

impl SignalPayload {
    /// The room-event type string this payload is published as.
    pub fn event_type(&self) -> &'static str {
        match self {
            SignalPayload::Invite(_) => "call.invite",
            SignalPayload::Answer(_) => "call.answer",
            SignalPayload::Candidates(_) => "call.candidates",
            SignalPayload::Hangup(_) => "call.hangup",
        }
    }

    pub fn call_id(&self) -> &CallId {
        match self {
            SignalPayload::Invite(c) => &c.call_id,
            SignalPayload::Answer(c) => &c.call_id,
            SignalPayload::Candidates(c) => &c.call_id,
            SignalPayload::Hangup(c) => &c.call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_round_trips_byte_identically() {
        let content = InviteContent {
            version: VERSION,
            call_id: CallId::from("abc-123"),
            offer: SessionDescription {
                sdp: "v=0...m=audio...".to_string(),
                sdp_type: SdpType::Offer,
            },
            lifetime: 60_000,
        };
        let once = serde_json::to_string(&content).unwrap();
        let parsed: InviteContent = serde_json::from_str(&once).unwrap();
        let twice = serde_json::to_string(&parsed).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn candidate_field_names_match_the_wire_format() {
        let candidate = IceCandidateSdp {
            candidate: "candidate:1 1 UDP 1 1.2.3.4 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        };
        let json = serde_json::to_value(&candidate).unwrap();
        assert!(json.get("sdpMid").is_some());
        assert!(json.get("sdpMLineIndex").is_some());
    }
}
