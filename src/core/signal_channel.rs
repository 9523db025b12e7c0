//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The `SignalChannel` port: publishes signalling payloads into
//! a room on the federated messaging substrate. The core never parses room
//! membership or encryption concerns; it only ever publishes and, via
//! the controller's `on_invite`/`on_answer`/`on_candidates`/`on_hangup`
//! entry points, receives already-decoded `SignalPayload`s handed to it by
//! the host.
//!
//! Grounded on `ringrtc`'s `lite::http::Delegate`/`lite::sfu` request shape:
//! one narrow async capability, errors surfaced as an owned `String` rather
//! than threading the host's transport error type through this crate.

use async_trait::async_trait;

use crate::core::signaling::SignalPayload;
use crate::error::Result;

/// Publishes call-signalling events into a room. A single implementation
/// typically backs every call in a process; the controller never assumes
/// anything about delivery ordering beyond what the room substrate itself
/// guarantees.
#[async_trait]
pub trait SignalChannel: Send + Sync + 'static {
    /// Publishes `payload` into `room_id`. Failure here is routed through
    /// `CandidatePump`'s retry policy for candidates, and treated as
    /// call-ending for invite/answer/hangup.
    async fn publish(&self, room_id: &str, payload: SignalPayload) -> Result<()>;
}
