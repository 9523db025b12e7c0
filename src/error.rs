//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Error vocabularies for the call signalling core.
//!
//! Two distinct things live here, matching the distinction the propagation
//! policy draws between "codes, not types" and ordinary `Result` plumbing:
//!
//! - [`ErrorCode`] is the small, stable, client-facing taxonomy delivered via
//!   [`crate::core::event_sink::EventSink::on_error`].
//! - [`CallError`] is this crate's internal `Result` error type, used for
//!   fallible port calls and state-guard violations.

use std::fmt;

/// This crate's `Result` alias.
pub type Result<T> = std::result::Result<T, CallError>;

/// Client-facing error taxonomy. Codes, not types: stable and `Copy` so
/// hosts can match on them without pulling in the whole error enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The media provider failed to create a local offer.
    LocalOfferFailed,
    /// Capture was denied or no hardware was available.
    NoUserMedia,
    /// `place_voice`/`place_video` was called with no error listener registered.
    NoErrorListener,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorCode::LocalOfferFailed => "local_offer_failed",
            ErrorCode::NoUserMedia => "no_user_media",
            ErrorCode::NoErrorListener => "no_error_listener",
        };
        write!(f, "{}", s)
    }
}

/// Internal error type used for `Result` plumbing within the core and its
/// ports. Not every variant here is surfaced to the host as an [`ErrorCode`];
/// most are logged and swallowed.
#[derive(thiserror::Error, Debug)]
pub enum CallError {
    #[error("place_voice/place_video called with no error listener registered")]
    NoErrorListener,

    #[error("media acquisition failed: {0}")]
    NoUserMedia(String),

    #[error("media provider failed to create a local offer: {0}")]
    LocalOfferFailed(String),

    #[error("media provider failed to create a local answer: {0}")]
    LocalAnswerFailed(String),

    #[error("media provider operation failed: {0}")]
    MediaProvider(String),

    #[error("signal channel publish failed: {0}")]
    SignalChannel(String),

    #[error("unexpected event {event} while in state {state}")]
    UnexpectedState { state: String, event: String },

    #[error("call has already ended")]
    AlreadyEnded,
}
