//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The call controller: a per-call state machine driven by user actions,
//! inbound signalling, and MediaProvider callbacks.
//!
//! Each `Call` lives behind exactly one [`Actor`], which gives it
//! single-threaded-cooperative semantics: every mutation of `Call`'s fields
//! runs as one actor task, in arrival order, and no callback ever overlaps
//! another. Suspending work (capture, description creation, publish) runs
//! as a plain `tokio::spawn`ed future operating only on cloned port
//! handles; it never touches `&mut Call` directly, instead it re-enters the
//! actor with the result, so every await site re-checks `state == ended`
//! before it can mutate anything stale.
//!
//! Grounded on `ringrtc`'s `core::call::Call`/`core::call_manager::CallHandle`
//! split (owning state vs. cheap cloneable handle) and `group_call.rs`'s
//! pattern of routing every external callback back through one actor.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::oneshot;

use crate::common::actor::Actor;
use crate::common::{
    generate_call_id, turn_servers_or_fallback, CallDirection, CallId, CallMediaType, HangupParty,
    TurnServer,
};
use crate::core::candidate_pump::CandidatePump;
use crate::core::event_sink::EventSink;
use crate::core::media_provider::{
    AnswerConstraints, IceConnectionState, IceServerConfig, MediaConstraints, MediaProvider,
    MediaStreamHandle, PeerConnectionEvents, PeerConnectionHandle, ProviderVariant,
    SignallingState,
};
use crate::core::signal_channel::SignalChannel;
use crate::core::signaling::{
    AnswerContent, CandidatesContent, HangupContent, IceCandidateSdp, InviteContent,
    SessionDescription, SignalPayload, VERSION,
};
use crate::error::{CallError, ErrorCode, Result};

/// The call's phase.
///
/// Outbound path: `Fledgling → WaitLocalMedia → CreateOffer → InviteSent →
/// Connecting → Connected → Ended`.
/// Inbound path: `Fledgling → Ringing → WaitLocalMedia → CreateAnswer →
/// Connecting → Connected → Ended`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    Fledgling,
    Ringing,
    WaitLocalMedia,
    CreateOffer,
    CreateAnswer,
    InviteSent,
    Connecting,
    Connected,
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A renderer binding for a local or remote media stream. A no-op
/// implementation is fine for voice-only hosts.
pub trait View: Send + Sync + 'static {
    fn bind(&self, url: &str);
    fn pause(&self) {}
}

/// Converts an opaque stream handle into a URL a `View` can render. Required
/// when video views are used.
pub trait UrlMinter: Send + Sync + 'static {
    fn mint(&self, stream: &MediaStreamHandle) -> String;
}

/// Construction options for a new call.
pub struct CallOptions {
    pub room_id: String,
    pub media_provider: Arc<dyn MediaProvider>,
    pub signal_channel: Arc<dyn SignalChannel>,
    pub event_sink: Arc<dyn EventSink>,
    pub url_minter: Arc<dyn UrlMinter>,
    pub turn_servers: Vec<TurnServer>,
    pub invite_lifetime_ms: u64,
}

impl CallOptions {
    pub fn new(
        room_id: impl Into<String>,
        media_provider: Arc<dyn MediaProvider>,
        signal_channel: Arc<dyn SignalChannel>,
        event_sink: Arc<dyn EventSink>,
        url_minter: Arc<dyn UrlMinter>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            media_provider,
            signal_channel,
            event_sink,
            url_minter,
            turn_servers: Vec::new(),
            invite_lifetime_ms: crate::common::CALL_TIMEOUT_MS,
        }
    }

    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServer>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    pub fn with_invite_lifetime_ms(mut self, invite_lifetime_ms: u64) -> Self {
        self.invite_lifetime_ms = invite_lifetime_ms;
        self
    }
}

/// A read-only view of a call's current fields, for introspection and
/// testing. Taking one never blocks the caller beyond a single round trip
/// through the actor.
#[derive(Clone, Debug)]
pub struct CallSnapshot {
    pub call_id: CallId,
    pub room_id: Arc<str>,
    pub direction: CallDirection,
    pub media_type: CallMediaType,
    pub state: CallState,
    pub hangup_party: HangupParty,
    pub hangup_reason: Option<String>,
    pub did_connect: bool,
}

/// Routes WebRTC-level callbacks from a peer connection back into the
/// owning call's actor. Holds only the actor handle, never the `Call`
/// itself, so it cannot create a retention cycle.
struct ConnectionEventRouter {
    actor: Actor<Call>,
}

impl PeerConnectionEvents for ConnectionEventRouter {
    fn on_local_candidate(&self, candidate: IceCandidateSdp) {
        self.actor.send(move |call| call.on_local_candidate(candidate));
    }

    fn on_add_stream(&self, stream: MediaStreamHandle) {
        self.actor.send(move |call| call.on_remote_stream_added(stream));
    }

    fn on_ice_state_changed(&self, state: IceConnectionState) {
        self.actor.send(move |call| call.on_ice_state_changed(state));
    }

    fn on_signalling_state_changed(&self, state: SignallingState) {
        self.actor.send(move |call| call.on_signalling_state_changed(state));
    }

    fn on_remote_stream_ended(&self) {
        self.actor.send(|call| call.on_remote_stream_ended());
    }
}

fn sdp_has_video(sdp: &str) -> bool {
    sdp.lines().any(|line| line.starts_with("m=video"))
}

/// The call's state, owned exclusively by its actor task.
struct Call {
    call_id: CallId,
    room_id: Arc<str>,

    media_provider: Arc<dyn MediaProvider>,
    signal_channel: Arc<dyn SignalChannel>,
    event_sink: Arc<dyn EventSink>,
    url_minter: Arc<dyn UrlMinter>,

    self_actor: Actor<Call>,
    candidate_pump: CandidatePump,

    direction: CallDirection,
    media_type: CallMediaType,
    state: CallState,
    hangup_party: HangupParty,
    hangup_reason: Option<String>,
    did_connect: bool,

    turn_servers: Vec<TurnServer>,
    invite_lifetime_ms: u64,
    remote_offer_age_ms: u64,

    local_media_handle: Option<MediaStreamHandle>,
    remote_media_handle: Option<MediaStreamHandle>,
    peer_connection_handle: Option<PeerConnectionHandle>,

    local_view: Option<Arc<dyn View>>,
    remote_view: Option<Arc<dyn View>>,

    successor: Option<CallHandle>,

    ringing_timeout_epoch: u64,
    invite_timeout_epoch: u64,
}

impl Call {
    fn ice_server_configs(&self) -> Vec<IceServerConfig> {
        match self.media_provider.variant() {
            ProviderVariant::Mozilla | ProviderVariant::Webkit => self
                .turn_servers
                .iter()
                .flat_map(|t| {
                    t.urls.iter().map(move |url| IceServerConfig {
                        urls: vec![url.clone()],
                        username: t.username.clone(),
                        credential: t.credential.clone(),
                    })
                })
                .collect(),
            ProviderVariant::Generic => self
                .turn_servers
                .iter()
                .map(|t| IceServerConfig {
                    urls: t.urls.clone(),
                    username: t.username.clone(),
                    credential: t.credential.clone(),
                })
                .collect(),
        }
    }

    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id.clone(),
            room_id: self.room_id.clone(),
            direction: self.direction,
            media_type: self.media_type,
            state: self.state,
            hangup_party: self.hangup_party,
            hangup_reason: self.hangup_reason.clone(),
            did_connect: self.did_connect,
        }
    }

    // ---- public operations ----

    fn place_voice_sync(&mut self) -> Result<()> {
        if self.state != CallState::Fledgling {
            return Err(CallError::UnexpectedState {
                state: self.state.to_string(),
                event: "place_voice".to_string(),
            });
        }
        if !self.event_sink.has_error_listener() {
            return Err(CallError::NoErrorListener);
        }
        self.direction = CallDirection::Outbound;
        self.media_type = CallMediaType::Voice;
        self.state = CallState::WaitLocalMedia;
        info!("{}: place_voice, state={}", self.call_id, self.state);
        self.spawn_acquire_for_invite(MediaConstraints::AudioOnly);
        Ok(())
    }

    fn place_video_sync(
        &mut self,
        local_view: Option<Arc<dyn View>>,
        remote_view: Option<Arc<dyn View>>,
    ) -> Result<()> {
        if self.state != CallState::Fledgling {
            return Err(CallError::UnexpectedState {
                state: self.state.to_string(),
                event: "place_video".to_string(),
            });
        }
        if !self.event_sink.has_error_listener() {
            return Err(CallError::NoErrorListener);
        }
        self.direction = CallDirection::Outbound;
        self.media_type = CallMediaType::Video;
        self.local_view = local_view;
        self.remote_view = remote_view;
        self.state = CallState::WaitLocalMedia;
        info!("{}: place_video, state={}", self.call_id, self.state);
        self.spawn_acquire_for_invite(MediaConstraints::audio_video_360p());
        Ok(())
    }

    fn spawn_acquire_for_invite(&self, constraints: MediaConstraints) {
        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let result = provider.acquire(constraints).await;
            actor.send(move |call: &mut Call| call.got_user_media_for_invite(result));
        });
    }

    fn answer_sync(&mut self) -> Result<()> {
        if self.state != CallState::Ringing && self.state != CallState::WaitLocalMedia {
            return Err(CallError::UnexpectedState {
                state: self.state.to_string(),
                event: "answer".to_string(),
            });
        }
        self.state = CallState::WaitLocalMedia;
        let constraints = if self.media_type == CallMediaType::Video {
            MediaConstraints::audio_video_360p()
        } else {
            MediaConstraints::AudioOnly
        };
        info!("{}: answer, state={}", self.call_id, self.state);
        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let result = provider.acquire(constraints).await;
            actor.send(move |call: &mut Call| call.got_user_media_for_answer(result));
        });
        Ok(())
    }

    fn set_remote_view(&mut self, view: Arc<dyn View>) {
        if let Some(stream) = self.remote_media_handle.clone() {
            let url = self.url_minter.mint(&stream);
            view.bind(&url);
        }
        self.remote_view = Some(view);
    }

    fn hangup(&mut self, reason: String, suppress_event: bool) {
        self.finish(HangupParty::Local, reason, !suppress_event, !suppress_event);
    }

    // ---- inbound signalling intake ----

    fn on_invite(&mut self, offer: SessionDescription, lifetime_ms: u64, age_ms: u64) {
        if self.state != CallState::Fledgling {
            debug!("{}: on_invite dropped, state={}", self.call_id, self.state);
            return;
        }
        self.direction = CallDirection::Inbound;
        self.invite_lifetime_ms = lifetime_ms;
        self.remote_offer_age_ms = age_ms;
        self.media_type = if sdp_has_video(&offer.sdp) {
            CallMediaType::Video
        } else {
            CallMediaType::Voice
        };

        let events: Arc<dyn PeerConnectionEvents> = Arc::new(ConnectionEventRouter {
            actor: self.self_actor.clone(),
        });
        let ice_servers = self.ice_server_configs();
        let pc = match self.media_provider.new_peer_connection(&ice_servers, events) {
            Ok(pc) => pc,
            Err(err) => {
                warn!("{}: new_peer_connection failed on invite: {}", self.call_id, err);
                self.event_sink.on_error(ErrorCode::LocalOfferFailed);
                return;
            }
        };
        self.peer_connection_handle = Some(pc.clone());

        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let result = provider.set_remote_description(&pc, offer).await;
            actor.send(move |call: &mut Call| call.on_remote_description_traced("invite", result));
        });

        self.state = CallState::Ringing;
        self.ringing_timeout_epoch += 1;
        let epoch = self.ringing_timeout_epoch;
        let remaining = self.invite_lifetime_ms.saturating_sub(age_ms);
        info!(
            "{}: on_invite, state={}, ringing timeout in {}ms",
            self.call_id, self.state, remaining
        );
        self.self_actor
            .send_delayed(Duration::from_millis(remaining), move |call| {
                call.on_ringing_timeout(epoch)
            });
    }

    /// Description-set failures don't affect call liveness: log and
    /// move on, whichever side of the exchange they came from.
    fn on_remote_description_traced(&mut self, context: &str, result: Result<()>) {
        if let Err(err) = result {
            debug!("{}: set_remote_description ({}) failed: {}", self.call_id, context, err);
        }
    }

    fn on_answer(&mut self, msg: AnswerContent) {
        if self.state == CallState::Ended {
            return;
        }
        let Some(pc) = self.peer_connection_handle.clone() else {
            return;
        };
        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let result = provider.set_remote_description(&pc, msg.answer).await;
            actor.send(move |call: &mut Call| call.on_remote_description_traced("answer", result));
        });
        self.state = CallState::Connecting;
        info!("{}: on_answer, state={}", self.call_id, self.state);
    }

    fn on_candidates(&mut self, msg: CandidatesContent) {
        if self.state == CallState::Ended {
            return;
        }
        let Some(pc) = self.peer_connection_handle.clone() else {
            return;
        };
        let provider = self.media_provider.clone();
        let call_id = self.call_id.clone();
        tokio::spawn(async move {
            for candidate in msg.candidates {
                if let Err(err) = provider.add_remote_candidate(&pc, candidate).await {
                    debug!("{}: add_remote_candidate failed (best-effort): {}", call_id, err);
                }
            }
        });
    }

    fn on_hangup(&mut self, msg: HangupContent) {
        self.finish(HangupParty::Remote, msg.reason, false, true);
    }

    fn on_answered_elsewhere(&mut self) {
        self.finish(HangupParty::Remote, "answered_elsewhere".to_string(), false, true);
    }

    // ---- offer path (outbound) ----

    fn got_user_media_for_invite(&mut self, result: Result<MediaStreamHandle>) {
        if let Some(successor) = self.successor.take() {
            if let Ok(stream) = result {
                successor.deliver_transferred_stream(stream);
            }
            return;
        }
        if self.state == CallState::Ended {
            return;
        }
        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                warn!("{}: acquire failed: {}", self.call_id, err);
                self.event_sink.on_error(ErrorCode::NoUserMedia);
                self.finish(HangupParty::Local, "no_user_media".to_string(), true, true);
                return;
            }
        };

        if self.media_type == CallMediaType::Video {
            if let Some(view) = &self.local_view {
                view.bind(&self.url_minter.mint(&stream));
            }
        }
        self.local_media_handle = Some(stream.clone());
        self.state = CallState::CreateOffer;

        let events: Arc<dyn PeerConnectionEvents> = Arc::new(ConnectionEventRouter {
            actor: self.self_actor.clone(),
        });
        let ice_servers = self.ice_server_configs();
        let pc = match self.media_provider.new_peer_connection(&ice_servers, events) {
            Ok(pc) => pc,
            Err(err) => {
                warn!("{}: new_peer_connection failed on offer: {}", self.call_id, err);
                self.event_sink.on_error(ErrorCode::LocalOfferFailed);
                return;
            }
        };
        self.peer_connection_handle = Some(pc.clone());
        self.media_provider.attach_stream(&pc, &stream);

        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let result = provider.create_offer(&pc).await;
            actor.send(move |call: &mut Call| call.on_offer_created(result));
        });
    }

    fn on_offer_created(&mut self, result: Result<SessionDescription>) {
        if self.state == CallState::Ended {
            return;
        }
        let offer = match result {
            Ok(offer) => offer,
            Err(err) => {
                warn!("{}: create_offer failed: {}", self.call_id, err);
                self.event_sink.on_error(ErrorCode::LocalOfferFailed);
                return;
            }
        };
        let Some(pc) = self.peer_connection_handle.clone() else {
            return;
        };
        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        let offer_for_publish = offer.clone();
        tokio::spawn(async move {
            if let Err(err) = provider.set_local_description(&pc, offer).await {
                debug!("set_local_description (offer) failed: {}", err);
            }
            actor.send(move |call: &mut Call| call.publish_invite(offer_for_publish));
        });
    }

    fn publish_invite(&mut self, offer: SessionDescription) {
        if self.state == CallState::Ended {
            return;
        }
        let channel = self.signal_channel.clone();
        let room_id = self.room_id.to_string();
        let call_id = self.call_id.clone();
        let lifetime = self.invite_lifetime_ms;
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let content = InviteContent {
                version: VERSION,
                call_id,
                offer,
                lifetime,
            };
            let result = channel.publish(&room_id, SignalPayload::Invite(content)).await;
            actor.send(move |call: &mut Call| call.on_invite_published(result));
        });
    }

    fn on_invite_published(&mut self, result: Result<()>) {
        if self.state == CallState::Ended {
            return;
        }
        match result {
            Ok(()) => {
                self.state = CallState::InviteSent;
                self.invite_timeout_epoch += 1;
                let epoch = self.invite_timeout_epoch;
                let lifetime = self.invite_lifetime_ms;
                info!("{}: invite published, state={}", self.call_id, self.state);
                self.self_actor
                    .send_delayed(Duration::from_millis(lifetime), move |call| {
                        call.on_invite_timeout(epoch)
                    });
            }
            Err(err) => {
                warn!("{}: publishing call.invite failed: {}", self.call_id, err);
                self.finish(HangupParty::Local, "signal_publish_failed".to_string(), false, true);
            }
        }
    }

    fn on_invite_timeout(&mut self, epoch: u64) {
        if epoch != self.invite_timeout_epoch || self.state != CallState::InviteSent {
            return;
        }
        info!("{}: invite timed out", self.call_id);
        self.finish(HangupParty::Local, "invite_timeout".to_string(), true, true);
    }

    fn on_ringing_timeout(&mut self, epoch: u64) {
        if epoch != self.ringing_timeout_epoch || self.state != CallState::Ringing {
            return;
        }
        info!("{}: ringing timed out, treating as remote hangup", self.call_id);
        self.finish(HangupParty::Remote, "invite_timeout".to_string(), false, true);
    }

    // ---- answer path (inbound) ----

    fn got_user_media_for_answer(&mut self, result: Result<MediaStreamHandle>) {
        if self.state == CallState::Ended {
            return;
        }
        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                warn!("{}: acquire failed for answer: {}", self.call_id, err);
                self.event_sink.on_error(ErrorCode::NoUserMedia);
                self.finish(HangupParty::Local, "no_user_media".to_string(), true, true);
                return;
            }
        };

        if self.media_type == CallMediaType::Video {
            if let Some(view) = &self.local_view {
                view.bind(&self.url_minter.mint(&stream));
            }
        }
        self.local_media_handle = Some(stream.clone());
        let Some(pc) = self.peer_connection_handle.clone() else {
            warn!("{}: no peer connection available to answer on", self.call_id);
            return;
        };
        self.media_provider.attach_stream(&pc, &stream);
        self.state = CallState::CreateAnswer;

        let constraints = AnswerConstraints {
            offer_to_receive_audio: true,
            offer_to_receive_video: self.media_type == CallMediaType::Video,
        };
        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let result = provider.create_answer(&pc, constraints).await;
            actor.send(move |call: &mut Call| call.on_answer_created(result));
        });
    }

    fn on_answer_created(&mut self, result: Result<SessionDescription>) {
        if self.state == CallState::Ended {
            return;
        }
        let answer = match result {
            Ok(answer) => answer,
            Err(err) => {
                warn!("{}: create_answer failed: {}", self.call_id, err);
                self.event_sink.on_error(ErrorCode::LocalOfferFailed);
                return;
            }
        };
        let Some(pc) = self.peer_connection_handle.clone() else {
            return;
        };
        let provider = self.media_provider.clone();
        let actor = self.self_actor.clone();
        let answer_for_publish = answer.clone();
        tokio::spawn(async move {
            if let Err(err) = provider.set_local_description(&pc, answer).await {
                debug!("set_local_description (answer) failed: {}", err);
            }
            actor.send(move |call: &mut Call| call.publish_answer(answer_for_publish));
        });
    }

    fn publish_answer(&mut self, answer: SessionDescription) {
        if self.state == CallState::Ended {
            return;
        }
        self.state = CallState::Connecting;
        info!("{}: answer set locally, state={}", self.call_id, self.state);
        let channel = self.signal_channel.clone();
        let room_id = self.room_id.to_string();
        let call_id = self.call_id.clone();
        let actor = self.self_actor.clone();
        tokio::spawn(async move {
            let content = AnswerContent {
                version: VERSION,
                call_id,
                answer,
            };
            let result = channel.publish(&room_id, SignalPayload::Answer(content)).await;
            actor.send(move |call: &mut Call| call.on_answer_published(result));
        });
    }

    fn on_answer_published(&mut self, result: Result<()>) {
        if let Err(err) = result {
            warn!("{}: publishing call.answer failed: {}", self.call_id, err);
            self.finish(HangupParty::Local, "signal_publish_failed".to_string(), false, true);
        }
    }

    // ---- candidate trickling ----

    fn on_local_candidate(&mut self, candidate: IceCandidateSdp) {
        if self.state == CallState::Fledgling || self.state == CallState::Ended {
            return;
        }
        trace!("{}: local candidate gathered", self.call_id);
        self.candidate_pump.enqueue(candidate);
    }

    // ---- connectivity events ----

    fn on_ice_state_changed(&mut self, state: IceConnectionState) {
        if self.state == CallState::Ended {
            return;
        }
        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                self.did_connect = true;
                if self.state != CallState::Connected {
                    self.state = CallState::Connected;
                    info!("{}: connected", self.call_id);
                }
            }
            IceConnectionState::Failed => {
                warn!("{}: ICE failed", self.call_id);
                self.finish(HangupParty::Local, "ice_failed".to_string(), true, true);
            }
            _ => {}
        }
    }

    fn on_signalling_state_changed(&mut self, state: SignallingState) {
        trace!("{}: signalling state -> {:?}", self.call_id, state);
    }

    fn on_remote_stream_added(&mut self, stream: MediaStreamHandle) {
        if self.state == CallState::Ended {
            return;
        }
        if self.direction == CallDirection::Inbound
            && self.media_type == CallMediaType::Unset
            && self.media_provider.stream_has_video(&stream)
        {
            self.media_type = CallMediaType::Video;
        }
        self.remote_media_handle = Some(stream.clone());
        if let Some(view) = &self.remote_view {
            view.bind(&self.url_minter.mint(&stream));
        }
        if self.media_provider.is_open_webrtc() && self.state != CallState::Connected {
            self.did_connect = true;
            self.state = CallState::Connected;
            info!("{}: connected (inferred from remote stream, open_webrtc)", self.call_id);
        }
    }

    fn on_remote_stream_ended(&mut self) {
        info!("{}: remote stream ended, treating as remote hangup", self.call_id);
        self.finish(HangupParty::Remote, "remote_stream_ended".to_string(), false, true);
    }

    // ---- replacement / glare handoff ----

    fn replace_by(&mut self, new_call: CallHandle) {
        match self.state {
            CallState::WaitLocalMedia => {
                self.successor = Some(new_call.clone());
            }
            CallState::CreateOffer | CallState::InviteSent => {
                if let Some(stream) = self.local_media_handle.take() {
                    new_call.deliver_transferred_stream(stream);
                }
            }
            _ => {}
        }
        new_call.copy_view_bindings(self.local_view.clone(), self.remote_view.clone());
        self.event_sink.on_replaced(new_call);
        info!("{}: replaced", self.call_id);
        self.finish(HangupParty::Local, "replaced".to_string(), false, false);
    }

    // ---- termination ----

    /// The single path every termination (local hangup, remote hangup,
    /// timeouts, ICE failure, replacement) funnels through. `publish`
    /// controls whether a `call.hangup` wire event is sent; `notify`
    /// controls whether `EventSink::on_hangup` fires (suppressed for
    /// `replace_by`, where `on_replaced` already served that purpose).
    fn finish(&mut self, party: HangupParty, reason: String, publish: bool, notify: bool) {
        if self.state == CallState::Ended {
            return;
        }
        self.hangup_party = party;
        self.hangup_reason = Some(reason.clone());
        self.state = CallState::Ended;
        self.teardown();

        if publish {
            let channel = self.signal_channel.clone();
            let room_id = self.room_id.to_string();
            let call_id = self.call_id.clone();
            let reason_for_wire = reason.clone();
            tokio::spawn(async move {
                let content = HangupContent {
                    version: VERSION,
                    call_id,
                    reason: reason_for_wire,
                };
                if let Err(err) = channel.publish(&room_id, SignalPayload::Hangup(content)).await {
                    warn!("publishing call.hangup failed: {}", err);
                }
            });
        }
        if notify {
            self.event_sink.on_hangup(party, &reason);
        }
        info!("{}: ended, party={:?}, reason={}", self.call_id, party, reason);
    }

    fn teardown(&mut self) {
        self.candidate_pump.stop();
        if let Some(pc) = self.peer_connection_handle.take() {
            if !self.media_provider.is_signalling_closed(&pc) {
                self.media_provider.close(&pc);
            }
        }
        if let Some(stream) = self.local_media_handle.take() {
            self.media_provider.stop_tracks(&stream);
            self.media_provider.stop_stream(&stream);
        }
        self.remote_media_handle = None;
        if let Some(view) = &self.local_view {
            view.pause();
        }
        if let Some(view) = &self.remote_view {
            view.pause();
        }
    }
}

/// A cheap, `Clone`-able handle to a running call. This is the public
/// surface hosts and routers use; the real state lives behind the actor.
#[derive(Clone)]
pub struct CallHandle {
    actor: Actor<Call>,
    call_id: CallId,
    room_id: Arc<str>,
}

impl CallHandle {
    /// Constructs a new call in `Fledgling` state. Outbound calls then call
    /// `place_voice`/`place_video`; inbound calls are delivered straight
    /// into `on_invite` by the router that owns call discovery.
    pub fn new(options: CallOptions) -> Self {
        let call_id = generate_call_id();
        let room_id: Arc<str> = Arc::from(options.room_id.as_str());
        let turn_servers = turn_servers_or_fallback(options.turn_servers);
        let invite_lifetime_ms = options.invite_lifetime_ms;
        let media_provider = options.media_provider;
        let signal_channel = options.signal_channel;
        let event_sink = options.event_sink;
        let url_minter = options.url_minter;

        let call_id_for_pump = call_id.clone();
        let room_id_for_pump = room_id.to_string();
        let signal_channel_for_pump = signal_channel.clone();
        let call_id_for_state = call_id.clone();
        let room_id_for_state = room_id.clone();

        let actor = Actor::start(move |self_actor| {
            let candidate_pump =
                CandidatePump::new(call_id_for_pump, room_id_for_pump, signal_channel_for_pump);
            Call {
                call_id: call_id_for_state,
                room_id: room_id_for_state,
                media_provider,
                signal_channel,
                event_sink,
                url_minter,
                self_actor,
                candidate_pump,
                direction: CallDirection::Unset,
                media_type: CallMediaType::Unset,
                state: CallState::Fledgling,
                hangup_party: HangupParty::Unset,
                hangup_reason: None,
                did_connect: false,
                turn_servers,
                invite_lifetime_ms,
                remote_offer_age_ms: 0,
                local_media_handle: None,
                remote_media_handle: None,
                peer_connection_handle: None,
                local_view: None,
                remote_view: None,
                successor: None,
                ringing_timeout_epoch: 0,
                invite_timeout_epoch: 0,
            }
        });

        Self {
            actor,
            call_id,
            room_id,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn place_voice(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.actor.send(move |call: &mut Call| {
            let _ = tx.send(call.place_voice_sync());
        });
        rx.await.unwrap_or(Err(CallError::AlreadyEnded))
    }

    pub async fn place_video(
        &self,
        local_view: Option<Arc<dyn View>>,
        remote_view: Option<Arc<dyn View>>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.actor.send(move |call: &mut Call| {
            let _ = tx.send(call.place_video_sync(local_view, remote_view));
        });
        rx.await.unwrap_or(Err(CallError::AlreadyEnded))
    }

    pub async fn answer(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.actor.send(move |call: &mut Call| {
            let _ = tx.send(call.answer_sync());
        });
        rx.await.unwrap_or(Err(CallError::AlreadyEnded))
    }

    /// Ends the call locally. When `suppress_event` is true, no
    /// `EventSink::on_hangup` fires and no `call.hangup` is published; use
    /// this when a host already knows the outcome through some other
    /// channel and doesn't want a redundant notification.
    pub fn hangup(&self, reason: impl Into<String>, suppress_event: bool) {
        let reason = reason.into();
        self.actor
            .send(move |call: &mut Call| call.hangup(reason, suppress_event));
    }

    pub fn set_remote_view(&self, view: Arc<dyn View>) {
        self.actor.send(move |call: &mut Call| call.set_remote_view(view));
    }

    pub fn on_invite(&self, offer: SessionDescription, lifetime_ms: u64, age_ms: u64) {
        self.actor
            .send(move |call: &mut Call| call.on_invite(offer, lifetime_ms, age_ms));
    }

    pub fn on_answer(&self, msg: AnswerContent) {
        self.actor.send(move |call: &mut Call| call.on_answer(msg));
    }

    pub fn on_candidates(&self, msg: CandidatesContent) {
        self.actor.send(move |call: &mut Call| call.on_candidates(msg));
    }

    pub fn on_hangup(&self, msg: HangupContent) {
        self.actor.send(move |call: &mut Call| call.on_hangup(msg));
    }

    pub fn on_answered_elsewhere(&self) {
        self.actor.send(|call: &mut Call| call.on_answered_elsewhere());
    }

    pub fn replace_by(&self, new_call: CallHandle) {
        self.actor.send(move |call: &mut Call| call.replace_by(new_call));
    }

    pub async fn snapshot(&self) -> CallSnapshot {
        let (tx, rx) = oneshot::channel();
        self.actor.send(move |call: &mut Call| {
            let _ = tx.send(call.snapshot());
        });
        rx.await.expect("call actor dropped without responding")
    }

    fn deliver_transferred_stream(&self, stream: MediaStreamHandle) {
        self.actor
            .send(move |call: &mut Call| call.got_user_media_for_answer(Ok(stream)));
    }

    fn copy_view_bindings(&self, local_view: Option<Arc<dyn View>>, remote_view: Option<Arc<dyn View>>) {
        self.actor.send(move |call: &mut Call| {
            if local_view.is_some() {
                call.local_view = local_view;
            }
            if remote_view.is_some() {
                call.remote_view = remote_view;
            }
        });
    }
}
