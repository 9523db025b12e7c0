//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Batches locally-trickled ICE candidates and publishes them with
//! exponential-backoff retry.
//!
//! Candidates arriving within `CANDIDATE_COALESCE_MS` of the first
//! un-flushed one are coalesced into a single publish. On publish failure,
//! `attempts` (1-indexed, counting the attempt that just failed) drives the
//! next retry delay:
//!
//!   delay = CANDIDATE_RETRY_BASE_MS * 2^(attempts - 1)
//!
//! i.e. 500, 1000, 2000, 4000, 8000ms after failures 1 through 5. Once
//! `attempts` exceeds `CANDIDATE_RETRY_CEILING` the batch is dropped and
//! `attempts` resets to zero; the next freshly enqueued candidate starts a
//! new coalescing window from attempt 1.
//!
//! Grounded on `ringrtc`'s `simnet::actor` delayed-task pattern for the
//! retry scheduling itself (reused here via [`crate::common::actor::Actor`]
//! rather than hand-rolled timers), and on `mrp`'s retry/backoff
//! bookkeeping style (plain counters mutated in place, logged at `debug!`).

use std::time::Duration;

use log::{debug, warn};

use crate::common::actor::Actor;
use crate::common::{CallId, CANDIDATE_COALESCE_MS, CANDIDATE_RETRY_BASE_MS, CANDIDATE_RETRY_CEILING};
use crate::core::signal_channel::SignalChannel;
use crate::core::signaling::{CandidatesContent, IceCandidateSdp, SignalPayload, VERSION};

use std::sync::Arc;

/// Internal state of the pump, owned by its own actor so publish retries
/// never contend with the owning call's state.
struct PumpState {
    call_id: CallId,
    room_id: String,
    channel: Arc<dyn SignalChannel>,
    self_actor: Actor<PumpState>,
    pending: Vec<IceCandidateSdp>,
    attempts: u8,
    flush_scheduled: bool,
}

/// A handle to a running candidate pump. Cloning shares the same
/// underlying actor and pending batch.
#[derive(Clone)]
pub struct CandidatePump {
    actor: Actor<PumpState>,
}

impl CandidatePump {
    pub fn new(call_id: CallId, room_id: String, channel: Arc<dyn SignalChannel>) -> Self {
        let actor = Actor::start(move |self_actor| PumpState {
            call_id,
            room_id,
            channel,
            self_actor,
            pending: Vec::new(),
            attempts: 0,
            flush_scheduled: false,
        });
        Self { actor }
    }

    /// Enqueues one locally-gathered candidate. If no flush is currently
    /// scheduled, schedules one after the coalescing delay; otherwise the
    /// candidate just joins the batch already waiting to go out.
    pub fn enqueue(&self, candidate: IceCandidateSdp) {
        self.actor.send(move |state: &mut PumpState| {
            state.pending.push(candidate);
            // A nonzero attempt counter means a flush is already in flight
            // or backing off, so no new coalescing timer gets scheduled on
            // top of it; the candidate just joins the buffer that flush (or
            // the next retry) will pick up.
            if !state.flush_scheduled && state.attempts == 0 {
                state.flush_scheduled = true;
                let actor = state.self_actor.clone();
                actor.send_delayed(Duration::from_millis(CANDIDATE_COALESCE_MS), |state| {
                    state.flush_scheduled = false;
                    flush(state);
                });
            }
        });
    }

    /// Drops any pending candidates and cancels retry bookkeeping, e.g.
    /// when the owning call hangs up.
    pub fn stop(&self) {
        self.actor.stop();
    }
}

fn flush(state: &mut PumpState) {
    if state.pending.is_empty() {
        return;
    }
    // Drain (not clone) so anything enqueued while this publish is in
    // flight lands in a fresh `pending` rather than being silently wiped
    // out by a later `pending.clear()` on success.
    let batch = std::mem::take(&mut state.pending);
    let content = CandidatesContent {
        version: VERSION,
        call_id: state.call_id.clone(),
        candidates: batch.clone(),
    };
    state.attempts += 1;
    let attempts = state.attempts;
    debug!(
        "candidate_pump: publishing {} candidate(s) for {} (attempt {})",
        content.candidates.len(),
        state.call_id,
        attempts
    );
    let channel = state.channel.clone();
    let room_id = state.room_id.clone();
    let actor = state.self_actor.clone();
    tokio::spawn(async move {
        let result = channel.publish(&room_id, SignalPayload::Candidates(content)).await;
        actor.send(move |state: &mut PumpState| match result {
            Ok(()) => {
                state.attempts = 0;
                // Anything that arrived during the publish is already
                // sitting in `pending`; send it right away, no coalescing
                // delay on the chained flush.
                if !state.pending.is_empty() {
                    flush(state);
                }
            }
            Err(err) => {
                // Requeue the failed batch at the front, ahead of anything
                // enqueued meanwhile, to preserve emission order.
                let mut requeued = batch;
                requeued.append(&mut state.pending);
                state.pending = requeued;
                if attempts > CANDIDATE_RETRY_CEILING {
                    warn!(
                        "candidate_pump: giving up on {} after {} attempts: {}",
                        state.call_id, attempts, err
                    );
                    state.attempts = 0;
                    return;
                }
                let delay_ms = CANDIDATE_RETRY_BASE_MS * (1u64 << (attempts - 1));
                debug!(
                    "candidate_pump: publish failed for {} ({}), retrying in {}ms",
                    state.call_id, err, delay_ms
                );
                let retry_actor = state.self_actor.clone();
                retry_actor.send_delayed(Duration::from_millis(delay_ms), flush);
            }
        });
    });
}
