//! Voice sequencer integration tests
//!
//! Run on tokio's paused clock so playback durations and retry delays are
//! exact.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use docent_gateway::query::KnowledgeBase;
use docent_gateway::{Assistant, session_voice_id};
use docent_gateway::voice::{
    AudioSink, LocalSpeechEngine, PlaybackState, RemoteSynthesizer, Sequencer, SequencerConfig,
    SequencerEvent, SequencerHandle,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::assert_ok;

mod common;
use common::{
    MockLocal, MockRemote, MockSink, RemoteReply, Timeline, sample_kb, sample_resolver,
};

const LATENCY: Duration = Duration::from_millis(100);
const CLIP: Duration = Duration::from_secs(1);

struct Rig {
    timeline: Timeline,
    remote: Arc<MockRemote>,
    handle: SequencerHandle,
    events: UnboundedReceiver<SequencerEvent>,
}

fn rig(replies: Vec<RemoteReply>, sink: MockSink, local: MockLocal) -> Rig {
    let timeline = sink.timeline.clone();
    let remote = Arc::new(MockRemote::new(timeline.clone(), LATENCY, replies));

    let remote_dyn: Arc<dyn RemoteSynthesizer> = remote.clone();
    let local: Arc<dyn LocalSpeechEngine> = Arc::new(local);
    let sink: Arc<dyn AudioSink> = Arc::new(sink);

    let (handle, events) =
        Sequencer::spawn(SequencerConfig::new("voice-1"), Some(remote_dyn), local, sink);

    Rig {
        timeline,
        remote,
        handle,
        events,
    }
}

fn default_rig(replies: Vec<RemoteReply>) -> Rig {
    let timeline = Timeline::default();
    rig(
        replies,
        MockSink::new(timeline.clone(), CLIP),
        MockLocal::new(timeline, CLIP),
    )
}

fn drain(events: &mut UnboundedReceiver<SequencerEvent>) -> Vec<SequencerEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_answers_play_in_order_without_overlap() {
    let Rig {
        timeline,
        handle,
        mut events,
        ..
    } = default_rig(vec![]);

    assert_ok!(handle.speak("A", None));
    assert_ok!(handle.speak("B", None));
    assert_ok!(handle.speak("C", None));
    handle.finish().await.unwrap();

    assert_eq!(
        timeline.names(),
        vec![
            "remote:A", "start:A", "end:A", "remote:B", "start:B", "end:B", "remote:C", "start:C",
            "end:C",
        ]
    );
    assert!(timeline.at("start:B") >= timeline.at("end:A"));
    assert!(timeline.at("start:C") >= timeline.at("end:B"));

    let answers: Vec<String> = drain(&mut events)
        .into_iter()
        .map(|e| match e {
            SequencerEvent::Answer { text } => text,
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(answers, vec!["I'd say: A", "I'd say: B", "I'd say: C"]);
}

#[tokio::test(start_paused = true)]
async fn test_request_during_playback_waits() {
    let Rig {
        timeline, handle, ..
    } = default_rig(vec![]);

    assert_ok!(handle.speak("A", None));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.state(), PlaybackState::Playing);

    assert_ok!(handle.speak("B", None));
    handle.finish().await.unwrap();

    assert_eq!(timeline.count("stop:"), 0);
    assert!(timeline.at("remote:B") >= timeline.at("end:A"));
}

#[tokio::test(start_paused = true)]
async fn test_state_transitions() {
    let Rig { handle, .. } = default_rig(vec![]);
    let state = handle.subscribe();

    assert_eq!(handle.state(), PlaybackState::Idle);
    assert_ok!(handle.speak("A", None));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), PlaybackState::Requesting);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state(), PlaybackState::Playing);

    handle.finish().await.unwrap();
    assert_eq!(*state.borrow(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_remote_failure_falls_back_once() {
    let Rig {
        timeline,
        remote,
        handle,
        mut events,
    } = default_rig(vec![RemoteReply::Fail]);

    assert_ok!(handle.speak("A", Some("question".to_string())));
    handle.finish().await.unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        timeline.names(),
        vec!["remote:A", "local-start:A@en-us", "local-end:A"]
    );

    match drain(&mut events).as_slice() {
        [SequencerEvent::Degraded { text, reason }] => {
            assert_eq!(text, "A");
            assert!(reason.contains("synthesis unavailable"));
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_audio_falls_back() {
    let Rig {
        timeline,
        handle,
        mut events,
        ..
    } = default_rig(vec![RemoteReply::Empty]);

    assert_ok!(handle.speak("A", None));
    handle.finish().await.unwrap();

    assert_eq!(timeline.count("start:"), 0);
    assert_eq!(timeline.count("local-start:A"), 1);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SequencerEvent::Degraded { reason, .. }] if reason == "empty audio payload"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_affect_next_request() {
    let Rig {
        timeline,
        remote,
        handle,
        ..
    } = default_rig(vec![RemoteReply::Fail, RemoteReply::Audio]);

    assert_ok!(handle.speak("A", None));
    assert_ok!(handle.speak("B", None));
    handle.finish().await.unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        timeline.names(),
        vec![
            "remote:A",
            "local-start:A@en-us",
            "local-end:A",
            "remote:B",
            "start:B",
            "end:B",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_blocked_playback_retries_once_then_asks() {
    let timeline = Timeline::default();
    let Rig {
        handle, mut events, ..
    } = rig(
        vec![],
        MockSink::new(timeline.clone(), CLIP).refusing(2),
        MockLocal::new(timeline.clone(), CLIP),
    );

    assert_ok!(handle.speak("A", None));
    handle.finish().await.unwrap();

    let refusals = timeline.all("refused:A");
    assert_eq!(refusals.len(), 2);
    assert_eq!(refusals[1] - refusals[0], Duration::from_millis(500));
    assert_eq!(timeline.count("local-"), 0);

    match drain(&mut events).as_slice() {
        [
            SequencerEvent::Answer { .. },
            SequencerEvent::ManualPlayRequired { text, audio },
        ] => {
            assert_eq!(text, "A");
            assert_eq!(audio, b"A");
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_blocked_playback_recovers_on_retry() {
    let timeline = Timeline::default();
    let Rig { handle, .. } = rig(
        vec![],
        MockSink::new(timeline.clone(), CLIP).refusing(1),
        MockLocal::new(timeline.clone(), CLIP),
    );

    assert_ok!(handle.speak("A", None));
    handle.finish().await.unwrap();

    assert_eq!(timeline.names(), vec!["remote:A", "refused:A", "start:A", "end:A"]);
    assert_eq!(
        timeline.at("start:A") - timeline.at("refused:A"),
        Duration::from_millis(500)
    );
}

#[tokio::test(start_paused = true)]
async fn test_local_failure_reports_speech_failed() {
    let timeline = Timeline::default();
    let Rig {
        remote,
        handle,
        mut events,
        ..
    } = rig(
        vec![RemoteReply::Fail],
        MockSink::new(timeline.clone(), CLIP),
        MockLocal {
            fail: true,
            ..MockLocal::new(timeline.clone(), CLIP)
        },
    );

    assert_ok!(handle.speak("A", None));
    handle.finish().await.unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert_eq!(timeline.names(), vec!["remote:A", "local-failed:A"]);
    assert!(matches!(
        drain(&mut events).as_slice(),
        [SequencerEvent::Degraded { .. }, SequencerEvent::SpeechFailed { text, .. }] if text == "A"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_without_remote_speaks_locally() {
    let timeline = Timeline::default();
    let local: Arc<dyn LocalSpeechEngine> = Arc::new(MockLocal::new(timeline.clone(), CLIP));
    let sink: Arc<dyn AudioSink> = Arc::new(MockSink::new(timeline.clone(), CLIP));

    let (handle, mut events) = Sequencer::spawn(SequencerConfig::new("voice-1"), None, local, sink);

    assert_ok!(handle.speak("A", None));
    assert_ok!(handle.speak("B", None));
    handle.finish().await.unwrap();

    assert_eq!(
        timeline.names(),
        vec![
            "local-start:A@en-us",
            "local-end:A",
            "local-start:B@en-us",
            "local-end:B",
        ]
    );
    assert_eq!(
        drain(&mut events),
        vec![
            SequencerEvent::Answer {
                text: "A".to_string()
            },
            SequencerEvent::Answer {
                text: "B".to_string()
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_assistant_sends_corrected_query_as_context() {
    let Rig {
        remote, handle, ..
    } = default_rig(vec![]);

    let mut assistant = Assistant::new(sample_resolver(), handle);
    let resolution = assistant.handle_transcript("I.").unwrap();
    assert_eq!(resolution.answer, "Hello! Ask me anything about the document.");

    assistant.finish().await.unwrap();

    let requests = remote.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].text, resolution.answer);
    assert_eq!(requests[0].voice_id, "voice-1");
    assert_eq!(requests[0].context.as_deref(), Some("hi"));
}

#[tokio::test(start_paused = true)]
async fn test_broken_playback_is_not_repeated() {
    let timeline = Timeline::default();
    let Rig {
        remote,
        handle,
        mut events,
        ..
    } = rig(
        vec![],
        MockSink::new(timeline.clone(), CLIP).breaking(1),
        MockLocal::new(timeline.clone(), CLIP),
    );
    let state = handle.subscribe();

    assert_ok!(handle.speak("A", None));
    assert_ok!(handle.speak("B", None));
    handle.finish().await.unwrap();

    assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        timeline.names(),
        vec!["remote:A", "start:A", "broken:A", "remote:B", "start:B", "end:B"]
    );
    assert_eq!(timeline.count("local-"), 0);
    assert_eq!(*state.borrow(), PlaybackState::Idle);

    match drain(&mut events).as_slice() {
        [
            SequencerEvent::Answer { .. },
            SequencerEvent::PlaybackFailed { text, reason },
            SequencerEvent::Answer { text: next },
        ] => {
            assert_eq!(text, "A");
            assert!(reason.contains("decode error"));
            assert_eq!(next, "I'd say: B");
        }
        other => panic!("unexpected events {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_held_audio_plays_on_request() {
    let timeline = Timeline::default();
    let Rig {
        handle, mut events, ..
    } = rig(
        vec![],
        MockSink::new(timeline.clone(), CLIP).refusing(2),
        MockLocal::new(timeline.clone(), CLIP),
    );

    assert_ok!(handle.speak("A", None));
    assert!(matches!(
        events.recv().await,
        Some(SequencerEvent::Answer { .. })
    ));
    assert!(matches!(
        events.recv().await,
        Some(SequencerEvent::ManualPlayRequired { .. })
    ));

    assert_ok!(handle.play_held());
    // nothing left to play
    assert_ok!(handle.play_held());
    assert_ok!(handle.speak("B", None));
    handle.finish().await.unwrap();

    assert_eq!(
        timeline.names(),
        vec![
            "remote:A",
            "refused:A",
            "refused:A",
            "start:A",
            "end:A",
            "remote:B",
            "start:B",
            "end:B",
        ]
    );
    assert!(timeline.at("remote:B") >= timeline.at("end:A"));
}

#[tokio::test(start_paused = true)]
async fn test_held_audio_refused_again_stays_held() {
    let timeline = Timeline::default();
    let Rig {
        handle, mut events, ..
    } = rig(
        vec![],
        MockSink::new(timeline.clone(), CLIP).refusing(3),
        MockLocal::new(timeline.clone(), CLIP),
    );

    assert_ok!(handle.speak("A", None));
    assert_ok!(handle.play_held());
    assert_ok!(handle.play_held());
    handle.finish().await.unwrap();

    assert_eq!(timeline.count("refused:A"), 3);
    assert_eq!(timeline.count("start:A"), 1);

    let manual = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SequencerEvent::ManualPlayRequired { .. }))
        .count();
    assert_eq!(manual, 2);
}

#[test]
fn test_session_voice_priority() {
    let with_voice = sample_kb();
    let without_voice = KnowledgeBase::from_json(
        r#"{ "categories": { "greetings": { "title": "Greetings",
             "questions": { "hello": "Hi!" } } } }"#,
    )
    .unwrap();

    assert_eq!(
        session_voice_id(Some(&with_voice), Some("gateway-voice"), "local-voice"),
        "kb-voice"
    );
    assert_eq!(
        session_voice_id(Some(&without_voice), Some("gateway-voice"), "local-voice"),
        "gateway-voice"
    );
    assert_eq!(
        session_voice_id(None, Some(""), "local-voice"),
        "local-voice"
    );
    assert_eq!(session_voice_id(None, None, "local-voice"), "local-voice");
}
