//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Outbound call scenarios: placing a call, invite timeout, and glare
//! handoff.

use std::sync::Arc;
use std::time::Duration;

use callcore::core::call::{CallHandle, CallOptions, CallState};
use callcore::common::{CallDirection, HangupParty};
use callcore::testing::{FakeEventSink, FakeMediaProvider, FakeSignalChannel, FakeUrlMinter};

mod common;
use common::test_init;

async fn flush() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

fn new_call(
    media_provider: Arc<FakeMediaProvider>,
    signal_channel: Arc<FakeSignalChannel>,
    event_sink: Arc<FakeEventSink>,
) -> CallHandle {
    event_sink.set_has_error_listener(true);
    let options = CallOptions::new(
        "!room:example.org",
        media_provider,
        signal_channel,
        event_sink,
        Arc::new(FakeUrlMinter),
    );
    CallHandle::new(options)
}

#[tokio::test]
async fn happy_outbound_voice_call() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel.clone(), event_sink.clone());

    call.place_voice().await.unwrap();
    flush().await;

    let invites = signal_channel.published_invites();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].lifetime, 60_000);
    assert_eq!(invites[0].offer.sdp_type, callcore::core::signaling::SdpType::Offer);

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::InviteSent);
    assert_eq!(snapshot.direction, CallDirection::Outbound);

    call.on_answer(callcore::core::signaling::AnswerContent {
        version: callcore::core::signaling::VERSION,
        call_id: call.call_id().clone(),
        answer: callcore::core::signaling::SessionDescription {
            sdp: "v=0...m=audio...".to_string(),
            sdp_type: callcore::core::signaling::SdpType::Answer,
        },
    });
    flush().await;
    assert_eq!(call.snapshot().await.state, CallState::Connecting);

    call.hangup("user_hangup", false);
    flush().await;

    let hangups = signal_channel.published_hangups();
    assert_eq!(hangups.len(), 1);
    assert_eq!(hangups[0].reason, "user_hangup");
    assert_eq!(event_sink.hangups(), vec![(HangupParty::Local, "user_hangup".to_string())]);

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ended);
    assert_eq!(snapshot.hangup_party, HangupParty::Local);
}

#[tokio::test(start_paused = true)]
async fn invite_timeout_after_exactly_the_lifetime() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel.clone(), event_sink.clone());

    call.place_voice().await.unwrap();
    flush().await;
    assert_eq!(call.snapshot().await.state, CallState::InviteSent);

    tokio::time::advance(Duration::from_millis(60_000 + 10)).await;
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ended);
    assert_eq!(snapshot.hangup_party, HangupParty::Local);
    assert_eq!(snapshot.hangup_reason.as_deref(), Some("invite_timeout"));
    assert_eq!(event_sink.hangups().len(), 1);
}

#[tokio::test]
async fn glare_handoff_transfers_the_captured_stream() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel_a = Arc::new(FakeSignalChannel::new());
    let event_sink_a = Arc::new(FakeEventSink::new());
    let call_a = new_call(media_provider.clone(), signal_channel_a.clone(), event_sink_a.clone());

    call_a.place_voice().await.unwrap();
    flush().await;
    assert_eq!(call_a.snapshot().await.state, CallState::InviteSent);

    let signal_channel_b = Arc::new(FakeSignalChannel::new());
    let event_sink_b = Arc::new(FakeEventSink::new());
    event_sink_b.set_has_error_listener(true);
    let options_b = CallOptions::new(
        "!room:example.org",
        media_provider,
        signal_channel_b.clone(),
        event_sink_b.clone(),
        Arc::new(FakeUrlMinter),
    );
    let call_b = CallHandle::new(options_b);

    call_a.replace_by(call_b.clone());
    flush().await;

    assert_eq!(event_sink_a.replaced_count(), 1);
    assert!(event_sink_a.hangups().is_empty(), "replaced call must not emit a hangup event");
    assert!(signal_channel_a.published_hangups().is_empty(), "replaced call must not publish call.hangup");
    assert_eq!(call_a.snapshot().await.state, CallState::Ended);

    let snapshot_b = call_b.snapshot().await;
    assert_eq!(snapshot_b.state, CallState::CreateAnswer);
}
