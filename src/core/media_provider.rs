//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The `MediaProvider` port: the abstraction over capture and
//! peer-connection the core drives but never implements itself. A host
//! application supplies a concrete adapter over its media stack (WebRTC or
//! otherwise); the core only ever sees the opaque handles and typed
//! descriptions below.
//!
//! Modeled on `ringrtc`'s `core::platform::Platform` trait, but using trait
//! objects (`Arc<dyn MediaProvider>`, opaque `Arc<dyn Any + ...>` handles)
//! rather than `Platform`'s associated-type generics. `Platform` is
//! monomorphized per target platform for FFI reasons specific to a
//! multi-language binding crate; this crate has no such constraint; its cost
//! center is network I/O, not dynamic dispatch, so the simpler object-based
//! shape is a better fit. See DESIGN.md.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::signaling::{IceCandidateSdp, SessionDescription};
use crate::error::Result;

/// Constraints passed to `acquire`: audio-only, or audio+video
/// with a fixed 640x360 video capture size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaConstraints {
    AudioOnly,
    AudioVideo {
        min_width: u32,
        max_width: u32,
        min_height: u32,
        max_height: u32,
    },
}

impl MediaConstraints {
    pub const fn audio_video_360p() -> Self {
        MediaConstraints::AudioVideo {
            min_width: 640,
            max_width: 640,
            min_height: 360,
            max_height: 360,
        }
    }

    pub fn wants_video(&self) -> bool {
        matches!(self, MediaConstraints::AudioVideo { .. })
    }
}

/// Constraints passed to `create_answer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnswerConstraints {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
}

/// An ICE/STUN/TURN server entry, as handed to `new_peer_connection`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Distinguishes the shape a media provider wants its ICE server
/// configuration in: some adapters expect a single `url` per entry, others a
/// list of `urls` per entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderVariant {
    Mozilla,
    Webkit,
    Generic,
}

/// An opaque, non-owning handle to a media stream. The `MediaProvider`
/// implementation owns the real stream; the core only ever holds this.
#[derive(Clone)]
pub struct MediaStreamHandle(pub Arc<dyn Any + Send + Sync>);

impl fmt::Debug for MediaStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MediaStreamHandle")
    }
}

/// An opaque handle to a peer connection, exclusively owned by one `Call`
/// for its non-terminal lifetime.
#[derive(Clone)]
pub struct PeerConnectionHandle(pub Arc<dyn Any + Send + Sync>);

impl fmt::Debug for PeerConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PeerConnectionHandle")
    }
}

/// ICE connectivity states the media provider reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

/// Signalling (SDP) state of the underlying peer connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignallingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Callbacks a `MediaProvider` invokes as WebRTC-level events occur. The
/// core supplies a concrete implementation (routing back into the owning
/// `Call`) when it asks for a new peer connection; the provider never needs
/// to know what's on the other end.
pub trait PeerConnectionEvents: Send + Sync + 'static {
    fn on_local_candidate(&self, candidate: IceCandidateSdp);
    fn on_add_stream(&self, stream: MediaStreamHandle);
    fn on_ice_state_changed(&self, state: IceConnectionState);
    fn on_signalling_state_changed(&self, state: SignallingState);

    /// The remote stream ended. Not every adapter can observe this; default
    /// is to never fire it.
    fn on_remote_stream_ended(&self) {}
}

/// The media/peer-connection capability the core is driven through. All
/// state-mutating operations that may suspend (capture, description
/// creation) are `async`; the rest complete synchronously because they only
/// touch local state in the adapter.
#[async_trait]
pub trait MediaProvider: Send + Sync + 'static {
    /// Requests capture matching `constraints`. May suspend waiting on user
    /// permission. Called at most once per call.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<MediaStreamHandle>;

    /// Creates a new peer connection configured with `ice_servers`, wired to
    /// deliver WebRTC-level callbacks through `events`.
    fn new_peer_connection(
        &self,
        ice_servers: &[IceServerConfig],
        events: Arc<dyn PeerConnectionEvents>,
    ) -> Result<PeerConnectionHandle>;

    /// Attaches a previously acquired stream's tracks to the connection.
    fn attach_stream(&self, pc: &PeerConnectionHandle, stream: &MediaStreamHandle);

    async fn set_remote_description(
        &self,
        pc: &PeerConnectionHandle,
        sdp: SessionDescription,
    ) -> Result<()>;

    async fn create_offer(&self, pc: &PeerConnectionHandle) -> Result<SessionDescription>;

    async fn create_answer(
        &self,
        pc: &PeerConnectionHandle,
        constraints: AnswerConstraints,
    ) -> Result<SessionDescription>;

    async fn set_local_description(
        &self,
        pc: &PeerConnectionHandle,
        sdp: SessionDescription,
    ) -> Result<()>;

    /// Delivers one trickled remote candidate. Per-candidate failures are
    /// best-effort: callers swallow the error with a debug log rather than
    /// failing the call.
    async fn add_remote_candidate(
        &self,
        pc: &PeerConnectionHandle,
        candidate: IceCandidateSdp,
    ) -> Result<()>;

    fn close(&self, pc: &PeerConnectionHandle);

    fn is_signalling_closed(&self, pc: &PeerConnectionHandle) -> bool;

    fn stop_stream(&self, stream: &MediaStreamHandle);

    fn stop_tracks(&self, stream: &MediaStreamHandle);

    /// Whether `stream` carries a video track. Used to infer `media_type`
    /// for an inbound call whose type was not yet settled when the remote
    /// stream arrived. Adapters that can't cheaply answer this may return
    /// `false`; the call simply keeps treating itself as voice.
    fn stream_has_video(&self, stream: &MediaStreamHandle) -> bool {
        let _ = stream;
        false
    }

    /// Which ICE-server configuration shape this provider expects.
    /// Defaults to the common shape (a list of `urls` per entry).
    fn variant(&self) -> ProviderVariant {
        ProviderVariant::Generic
    }

    /// True for providers (e.g. an `OpenWebRTC`-backed adapter) that cannot
    /// report ICE connectivity state changes, so the controller must treat
    /// "remote media began playing" as the connected transition instead.
    fn is_open_webrtc(&self) -> bool {
        false
    }
}
