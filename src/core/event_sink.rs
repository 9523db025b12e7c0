//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! The `EventSink` port: the controller's only channel for notifying a host
//! application of terminal and advisory events. Unlike
//! `MediaProvider`/`SignalChannel`, an `EventSink` is not asked to do
//! anything that can fail; it's a pure notification surface, so its methods
//! are synchronous.
//!
//! Grounded on `ringrtc`'s `CallConnectionObserver`/`sim::FakeObserver`
//! shape: a small trait of `on_*` notification methods plus one predicate
//! method (`has_error_listener`) that gates whether an operation may even
//! begin, so `place_voice`/`place_video` without a registered error listener
//! fail fast rather than silently drop errors.

use crate::common::HangupParty;
use crate::core::call::CallHandle;
use crate::error::ErrorCode;

/// Notifies a host application of call lifecycle events it did not directly
/// request.
pub trait EventSink: Send + Sync + 'static {
    /// Whether a caller has registered to observe `on_error`. `place_voice`
    /// and `place_video` consult this before doing any work.
    fn has_error_listener(&self) -> bool;

    /// The call ended. `party` identifies who ended it; `reason` is a
    /// short, stable machine-readable string (e.g. `"remote_hangup"`,
    /// `"invite_timeout"`, `"ice_failed"`), never meant for direct display.
    fn on_hangup(&self, party: HangupParty, reason: &str);

    /// An operation failed in a way that does not by itself end the call.
    fn on_error(&self, code: ErrorCode);

    /// This call was superseded by `new_call`, the glare handoff path.
    /// Consumers should re-bind their UI to `new_call`.
    fn on_replaced(&self, new_call: CallHandle);
}
