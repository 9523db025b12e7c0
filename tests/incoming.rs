//
// Copyright (C) 2024 Calling Team
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Inbound call scenarios: invite intake, answering, ringing timeouts, and
//! the rest of the answer path.

use std::sync::Arc;
use std::time::Duration;

use callcore::common::{CallDirection, CallMediaType, HangupParty};
use callcore::core::call::{CallHandle, CallOptions, CallState};
use callcore::core::media_provider::{IceConnectionState, SignallingState};
use callcore::core::signaling::{
    AnswerContent, CandidatesContent, HangupContent, IceCandidateSdp, SdpType, SessionDescription,
    VERSION,
};
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
    let options = CallOptions::new(
        "!room:example.org",
        media_provider,
        signal_channel,
        event_sink,
        Arc::new(FakeUrlMinter),
    );
    CallHandle::new(options)
}

fn audio_offer() -> SessionDescription {
    SessionDescription {
        sdp: "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n".to_string(),
        sdp_type: SdpType::Offer,
    }
}

fn video_offer() -> SessionDescription {
    SessionDescription {
        sdp: "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n"
            .to_string(),
        sdp_type: SdpType::Offer,
    }
}

#[tokio::test]
async fn invite_infers_voice_and_moves_to_ringing() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider.clone(), signal_channel, event_sink);

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ringing);
    assert_eq!(snapshot.direction, CallDirection::Inbound);
    assert_eq!(snapshot.media_type, CallMediaType::Voice);
    assert_eq!(media_provider.peer_connections_created(), 1);
}

#[tokio::test]
async fn invite_with_video_media_section_infers_video() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel, event_sink);

    call.on_invite(video_offer(), 60_000, 0);
    flush().await;

    assert_eq!(call.snapshot().await.media_type, CallMediaType::Video);
}

#[tokio::test(start_paused = true)]
async fn aged_invite_shortens_the_ringing_timeout() {
    test_init();
    // lifetime 60_000, age_ms 45_000 -> 15_000ms to auto-hangup if never
    // answered.
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel.clone(), event_sink.clone());

    call.on_invite(audio_offer(), 60_000, 45_000);
    flush().await;
    assert_eq!(call.snapshot().await.state, CallState::Ringing);

    tokio::time::advance(Duration::from_millis(14_000)).await;
    flush().await;
    assert_eq!(call.snapshot().await.state, CallState::Ringing, "must not expire early");

    tokio::time::advance(Duration::from_millis(1_010)).await;
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ended);
    assert_eq!(snapshot.hangup_party, HangupParty::Remote);
    assert_eq!(event_sink.hangups().len(), 1);
    // A ringing timeout with no peer-connection yet must not panic; here a
    // peer-connection does exist, but hangup must still tear it down
    // cleanly.
    assert_eq!(media_provider.closes(), 1);
    assert!(signal_channel.published_hangups().is_empty(), "ringing timeout is local-only, no wire hangup");
}

#[tokio::test]
async fn answering_acquires_media_and_publishes_an_answer() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel.clone(), event_sink);

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;

    call.answer().await.unwrap();
    flush().await;

    let answers = signal_channel.published_answers();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].answer.sdp_type, SdpType::Answer);

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Connecting);
}

#[tokio::test]
async fn no_user_media_on_answer_auto_hangs_up() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider.clone(), signal_channel, event_sink.clone());

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;

    media_provider.fail_next_acquire();
    call.answer().await.unwrap();
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ended);
    assert_eq!(snapshot.hangup_party, HangupParty::Local);
    assert_eq!(snapshot.hangup_reason.as_deref(), Some("no_user_media"));
    assert_eq!(
        event_sink.errors(),
        vec![callcore::ErrorCode::NoUserMedia]
    );
}

#[tokio::test]
async fn ice_connected_after_answer_moves_to_connected_and_sets_did_connect() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider.clone(), signal_channel, event_sink);

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;
    call.answer().await.unwrap();
    flush().await;

    call.on_candidates(CandidatesContent {
        version: VERSION,
        call_id: call.call_id().clone(),
        candidates: vec![IceCandidateSdp {
            candidate: "candidate:1 1 UDP 1 1.2.3.4 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }],
    });
    flush().await;

    media_provider.simulate_ice_state(IceConnectionState::Connected);
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Connected);
    assert!(snapshot.did_connect);
}

#[tokio::test]
async fn remote_hangup_ends_the_call_without_publishing() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel.clone(), event_sink.clone());

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;

    call.on_hangup(HangupContent {
        version: VERSION,
        call_id: call.call_id().clone(),
        reason: "user_hangup".to_string(),
    });
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ended);
    assert_eq!(snapshot.hangup_party, HangupParty::Remote);
    assert_eq!(snapshot.hangup_reason.as_deref(), Some("user_hangup"));
    assert!(signal_channel.published_hangups().is_empty());
}

#[tokio::test]
async fn answered_elsewhere_ends_the_call_with_that_reason() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel, event_sink);

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;

    call.on_answered_elsewhere();
    flush().await;

    let snapshot = call.snapshot().await;
    assert_eq!(snapshot.state, CallState::Ended);
    assert_eq!(snapshot.hangup_reason.as_deref(), Some("answered_elsewhere"));
}

#[tokio::test]
async fn ended_call_drops_a_late_answer_without_mutating_state_further() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider, signal_channel, event_sink.clone());

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;
    call.hangup("user_hangup", false);
    flush().await;

    call.on_answer(AnswerContent {
        version: VERSION,
        call_id: call.call_id().clone(),
        answer: SessionDescription {
            sdp: "v=0...m=audio...".to_string(),
            sdp_type: SdpType::Answer,
        },
    });
    flush().await;

    assert_eq!(call.snapshot().await.state, CallState::Ended);
    assert_eq!(event_sink.hangups().len(), 1, "only the original hangup fires");
}

// A SignallingState change after the peer connection is up is purely
// advisory (trace-logged); it must never panic or change call state.
#[tokio::test]
async fn signalling_state_changes_are_advisory_only() {
    test_init();
    let media_provider = Arc::new(FakeMediaProvider::new());
    let signal_channel = Arc::new(FakeSignalChannel::new());
    let event_sink = Arc::new(FakeEventSink::new());
    let call = new_call(media_provider.clone(), signal_channel, event_sink);

    call.on_invite(audio_offer(), 60_000, 0);
    flush().await;

    media_provider.simulate_signalling_state(SignallingState::HaveRemoteOffer);
    flush().await;

    assert_eq!(call.snapshot().await.state, CallState::Ringing);
}
