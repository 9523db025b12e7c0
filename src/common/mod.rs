//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Common types shared across the call signalling core.

pub mod actor;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Unique call identification string. Generated at construction; stable for
/// the lifetime of the `Call`.
pub type CallId = std::sync::Arc<str>;

/// Default ringing/invite timeout, in milliseconds.
pub const CALL_TIMEOUT_MS: u64 = 60_000;

/// Fallback STUN server injected when no `turn_servers` are supplied.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Coalescing delay for the candidate pump.
pub const CANDIDATE_COALESCE_MS: u64 = 100;

/// Base delay for the candidate pump's exponential backoff.
pub const CANDIDATE_RETRY_BASE_MS: u64 = 500;

/// Attempt ceiling for the candidate pump: once the in-flight attempt count
/// exceeds this, the pump gives up on the current batch.
pub const CANDIDATE_RETRY_CEILING: u8 = 5;

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh `call_id`. Monotonic-ish: a process-local counter is
/// mixed with randomness so collisions are absent within a client session
/// without requiring any shared clock.
pub fn generate_call_id() -> CallId {
    let counter = CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let salt: u64 = rand::thread_rng().gen();
    CallId::from(format!("{counter:x}-{salt:016x}"))
}

/// The call's direction, settled on the first transition out of `fledgling`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallDirection {
    Unset,
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The call's media type, settled once media tracks are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallMediaType {
    Unset,
    Voice,
    Video,
}

impl fmt::Display for CallMediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Which party ended the call. Set once at termination and never reset:
/// `hangup_party`/`hangup_reason` are monotonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HangupParty {
    Unset,
    Local,
    Remote,
}

impl fmt::Display for HangupParty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A single TURN/STUN server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl TurnServer {
    pub fn stun_fallback() -> Self {
        Self {
            urls: vec![DEFAULT_STUN_SERVER.to_string()],
            username: None,
            credential: None,
        }
    }
}

/// Ensures `turn_servers` is never empty, injecting the fallback STUN entry
/// when the caller supplied none.
pub fn turn_servers_or_fallback(turn_servers: Vec<TurnServer>) -> Vec<TurnServer> {
    if turn_servers.is_empty() {
        vec![TurnServer::stun_fallback()]
    } else {
        turn_servers
    }
}
