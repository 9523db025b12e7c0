//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Core, platform-independent call signalling functionality.

pub mod call;
pub mod candidate_pump;
pub mod event_sink;
pub mod media_provider;
pub mod signal_channel;
pub mod signaling;

pub use call::{CallHandle, CallOptions, CallSnapshot, CallState, UrlMinter, View};
pub use candidate_pump::CandidatePump;
pub use event_sink::EventSink;
pub use media_provider::MediaProvider;
pub use signal_channel::SignalChannel;
