//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! In-memory fakes for the three ports, used by this crate's own tests and
//! exposed publicly so downstream hosts can exercise [`crate::core::call`]
//! without a real media stack or messaging substrate.
//!
//! Grounded on `ringrtc`'s `sim` module: each fake records what was done to
//! it behind a `Mutex`, and is driven entirely synchronously except where
//! the port itself demands an `async fn`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::HangupParty;
use crate::core::call::{CallHandle, UrlMinter, View};
use crate::core::event_sink::EventSink;
use crate::core::media_provider::{
    AnswerConstraints, IceConnectionState, IceServerConfig, MediaConstraints, MediaProvider,
    MediaStreamHandle, PeerConnectionEvents, PeerConnectionHandle, SignallingState,
};
use crate::core::signal_channel::SignalChannel;
use crate::core::signaling::{
    AnswerContent, CandidatesContent, HangupContent, InviteContent, SessionDescription, SdpType,
    SignalPayload,
};
use crate::error::{CallError, ErrorCode, Result};

/// A trivial opaque stream/peer-connection payload so [`Any`] downcasts in
/// tests are meaningful if ever needed.
#[derive(Debug, PartialEq, Eq)]
pub struct FakeResource(pub &'static str);

fn fake_stream(label: &'static str) -> MediaStreamHandle {
    MediaStreamHandle(Arc::new(FakeResource(label)))
}

fn fake_peer_connection(label: &'static str) -> PeerConnectionHandle {
    PeerConnectionHandle(Arc::new(FakeResource(label)))
}

/// Records every operation the controller asks of a `MediaProvider`.
/// `acquire`/description-creation results can be pre-seeded to fail via
/// [`FakeMediaProvider::fail_next_acquire`] and friends.
pub struct FakeMediaProvider {
    fail_acquire: Mutex<bool>,
    fail_offer: Mutex<bool>,
    fail_answer: Mutex<bool>,
    fail_new_peer_connection: Mutex<bool>,
    peer_connections_created: Mutex<u32>,
    closes: Mutex<u32>,
    /// The callbacks handed to the most recent `new_peer_connection`, so
    /// tests can simulate WebRTC-level events (ICE state, signalling
    /// state, remote stream) the way `ringrtc`'s `sim::Connection` lets
    /// its tests drive the FSM directly, without a real peer connection.
    last_events: Mutex<Option<Arc<dyn PeerConnectionEvents>>>,
}

impl FakeMediaProvider {
    pub fn new() -> Self {
        Self {
            fail_acquire: Mutex::new(false),
            fail_offer: Mutex::new(false),
            fail_answer: Mutex::new(false),
            fail_new_peer_connection: Mutex::new(false),
            peer_connections_created: Mutex::new(0),
            closes: Mutex::new(0),
            last_events: Mutex::new(None),
        }
    }

    pub fn fail_next_acquire(&self) {
        *self.fail_acquire.lock().unwrap() = true;
    }

    pub fn fail_next_offer(&self) {
        *self.fail_offer.lock().unwrap() = true;
    }

    pub fn fail_next_answer(&self) {
        *self.fail_answer.lock().unwrap() = true;
    }

    pub fn peer_connections_created(&self) -> u32 {
        *self.peer_connections_created.lock().unwrap()
    }

    pub fn closes(&self) -> u32 {
        *self.closes.lock().unwrap()
    }

    /// Fires `on_ice_state_changed(state)` on the most recently created
    /// peer connection's event callbacks, as if the underlying engine had
    /// reported it.
    pub fn simulate_ice_state(&self, state: IceConnectionState) {
        if let Some(events) = self.last_events.lock().unwrap().clone() {
            events.on_ice_state_changed(state);
        }
    }

    /// Fires `on_signalling_state_changed(state)` on the most recently
    /// created peer connection's event callbacks.
    pub fn simulate_signalling_state(&self, state: SignallingState) {
        if let Some(events) = self.last_events.lock().unwrap().clone() {
            events.on_signalling_state_changed(state);
        }
    }

    /// Fires `on_add_stream(stream)` on the most recently created peer
    /// connection's event callbacks.
    pub fn simulate_remote_stream(&self, stream: MediaStreamHandle) {
        if let Some(events) = self.last_events.lock().unwrap().clone() {
            events.on_add_stream(stream);
        }
    }
}

impl Default for FakeMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProvider for FakeMediaProvider {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<MediaStreamHandle> {
        if std::mem::take(&mut *self.fail_acquire.lock().unwrap()) {
            return Err(CallError::NoUserMedia("denied".to_string()));
        }
        let label = if constraints.wants_video() {
            "local-video-stream"
        } else {
            "local-audio-stream"
        };
        Ok(fake_stream(label))
    }

    fn new_peer_connection(
        &self,
        _ice_servers: &[IceServerConfig],
        events: Arc<dyn PeerConnectionEvents>,
    ) -> Result<PeerConnectionHandle> {
        if std::mem::take(&mut *self.fail_new_peer_connection.lock().unwrap()) {
            return Err(CallError::MediaProvider("pc creation denied".to_string()));
        }
        *self.peer_connections_created.lock().unwrap() += 1;
        *self.last_events.lock().unwrap() = Some(events);
        Ok(fake_peer_connection("pc"))
    }

    fn attach_stream(&self, _pc: &PeerConnectionHandle, _stream: &MediaStreamHandle) {}

    async fn set_remote_description(
        &self,
        _pc: &PeerConnectionHandle,
        _sdp: SessionDescription,
    ) -> Result<()> {
        Ok(())
    }

    async fn create_offer(&self, _pc: &PeerConnectionHandle) -> Result<SessionDescription> {
        if std::mem::take(&mut *self.fail_offer.lock().unwrap()) {
            return Err(CallError::LocalOfferFailed("simulated failure".to_string()));
        }
        Ok(SessionDescription {
            sdp: "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n".to_string(),
            sdp_type: SdpType::Offer,
        })
    }

    async fn create_answer(
        &self,
        _pc: &PeerConnectionHandle,
        _constraints: AnswerConstraints,
    ) -> Result<SessionDescription> {
        if std::mem::take(&mut *self.fail_answer.lock().unwrap()) {
            return Err(CallError::LocalAnswerFailed("simulated failure".to_string()));
        }
        Ok(SessionDescription {
            sdp: "v=0\r\no=- 2 1 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n".to_string(),
            sdp_type: SdpType::Answer,
        })
    }

    async fn set_local_description(
        &self,
        _pc: &PeerConnectionHandle,
        _sdp: SessionDescription,
    ) -> Result<()> {
        Ok(())
    }

    async fn add_remote_candidate(
        &self,
        _pc: &PeerConnectionHandle,
        _candidate: crate::core::signaling::IceCandidateSdp,
    ) -> Result<()> {
        Ok(())
    }

    fn close(&self, _pc: &PeerConnectionHandle) {
        *self.closes.lock().unwrap() += 1;
    }

    fn is_signalling_closed(&self, _pc: &PeerConnectionHandle) -> bool {
        false
    }

    fn stop_stream(&self, _stream: &MediaStreamHandle) {}

    fn stop_tracks(&self, _stream: &MediaStreamHandle) {}
}

/// Records every payload published to it. Can be told to fail the next N
/// publishes of a given kind, for exercising `CandidatePump` retry and the
/// invite/answer/hangup publish-failure paths.
pub struct FakeSignalChannel {
    fail_next_publishes: Mutex<u32>,
    invites: Mutex<Vec<InviteContent>>,
    answers: Mutex<Vec<AnswerContent>>,
    candidates: Mutex<Vec<CandidatesContent>>,
    hangups: Mutex<Vec<HangupContent>>,
}

impl FakeSignalChannel {
    pub fn new() -> Self {
        Self {
            fail_next_publishes: Mutex::new(0),
            invites: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            hangups: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_publishes(&self, count: u32) {
        *self.fail_next_publishes.lock().unwrap() = count;
    }

    pub fn published_invites(&self) -> Vec<InviteContent> {
        self.invites.lock().unwrap().clone()
    }

    pub fn published_answers(&self) -> Vec<AnswerContent> {
        self.answers.lock().unwrap().clone()
    }

    pub fn published_candidates(&self) -> Vec<CandidatesContent> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn published_hangups(&self) -> Vec<HangupContent> {
        self.hangups.lock().unwrap().clone()
    }
}

impl Default for FakeSignalChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalChannel for FakeSignalChannel {
    async fn publish(&self, _room_id: &str, payload: SignalPayload) -> Result<()> {
        {
            let mut remaining = self.fail_next_publishes.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(CallError::SignalChannel("simulated publish failure".to_string()));
            }
        }
        match payload {
            SignalPayload::Invite(content) => self.invites.lock().unwrap().push(content),
            SignalPayload::Answer(content) => self.answers.lock().unwrap().push(content),
            SignalPayload::Candidates(content) => self.candidates.lock().unwrap().push(content),
            SignalPayload::Hangup(content) => self.hangups.lock().unwrap().push(content),
        }
        Ok(())
    }
}

/// Records lifecycle notifications. `has_error_listener` defaults to
/// `false`, matching the real contract that a host must opt in.
pub struct FakeEventSink {
    has_error_listener: Mutex<bool>,
    hangups: Mutex<Vec<(HangupParty, String)>>,
    errors: Mutex<Vec<ErrorCode>>,
    replaced_with: Mutex<Vec<CallHandle>>,
}

impl FakeEventSink {
    pub fn new() -> Self {
        Self {
            has_error_listener: Mutex::new(false),
            hangups: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            replaced_with: Mutex::new(Vec::new()),
        }
    }

    pub fn set_has_error_listener(&self, value: bool) {
        *self.has_error_listener.lock().unwrap() = value;
    }

    pub fn hangups(&self) -> Vec<(HangupParty, String)> {
        self.hangups.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ErrorCode> {
        self.errors.lock().unwrap().clone()
    }

    pub fn replaced_count(&self) -> u32 {
        self.replaced_with.lock().unwrap().len() as u32
    }

    /// The successor call(s) this sink was told to rebind to, in order.
    pub fn replaced_with(&self) -> Vec<CallHandle> {
        self.replaced_with.lock().unwrap().clone()
    }
}

impl Default for FakeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for FakeEventSink {
    fn has_error_listener(&self) -> bool {
        *self.has_error_listener.lock().unwrap()
    }

    fn on_hangup(&self, party: HangupParty, reason: &str) {
        self.hangups.lock().unwrap().push((party, reason.to_string()));
    }

    fn on_error(&self, code: ErrorCode) {
        self.errors.lock().unwrap().push(code);
    }

    fn on_replaced(&self, new_call: CallHandle) {
        self.replaced_with.lock().unwrap().push(new_call);
    }
}

/// A `UrlMinter` that just labels the opaque handle's address, good enough
/// for assertions that a bind happened without caring about the value.
pub struct FakeUrlMinter;

impl UrlMinter for FakeUrlMinter {
    fn mint(&self, stream: &MediaStreamHandle) -> String {
        format!("fake://{:p}", Arc::as_ptr(&stream.0) as *const ())
    }
}

/// A `View` that just records every URL it was bound to, and whether it
/// was paused.
pub struct FakeView {
    bound: Mutex<Vec<String>>,
    paused: Mutex<u32>,
}

impl FakeView {
    pub fn new() -> Self {
        Self {
            bound: Mutex::new(Vec::new()),
            paused: Mutex::new(0),
        }
    }

    pub fn bound_urls(&self) -> Vec<String> {
        self.bound.lock().unwrap().clone()
    }

    pub fn pause_count(&self) -> u32 {
        *self.paused.lock().unwrap()
    }
}

impl Default for FakeView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for FakeView {
    fn bind(&self, url: &str) {
        self.bound.lock().unwrap().push(url.to_string());
    }

    fn pause(&self) {
        *self.paused.lock().unwrap() += 1;
    }
}
