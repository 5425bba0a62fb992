//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docent_gateway::query::{DocumentModel, KnowledgeBase, QueryResolver, StructuredMatcher};
use docent_gateway::voice::{
    ActivePlayback, AudioSink, LocalSpeechEngine, PlaybackError, RemoteSynthesizer,
    SynthesisRequest, SynthesizedSpeech, Utterance, Voice,
};
use docent_gateway::{Error, Result};
use tokio::time::Instant;

/// Knowledge base used across the integration tests
pub const SAMPLE_KB: &str = r#"{
  "metadata": { "voiceId": "kb-voice" },
  "categories": {
    "greetings": {
      "title": "Greetings",
      "questions": {
        "hello": "Hello! Ask me anything about the document.",
        "good_morning": "Good morning to you too!"
      }
    },
    "introduction": {
      "title": "Introduction",
      "questions": {
        "who are you": "I am the author of this document."
      }
    },
    "mentorship": {
      "title": "Mentorship",
      "questions": {
        "what do you think about mentorship": "Mentorship shaped my whole career."
      }
    },
    "general": {
      "title": "General",
      "questions": {},
      "fallbacks": {
        "unknown_question": "That is outside what I can speak to."
      }
    }
  }
}"#;

/// Free-text document used across the integration tests
pub const SAMPLE_DOCUMENT: &str = "Gardening Notes\n\n\
Tomatoes need full sun and regular watering. Basil grows well next to tomatoes.\n\n\
Compost improves soil structure over time. Worms help break down kitchen scraps.";

#[must_use]
pub fn sample_kb() -> KnowledgeBase {
    KnowledgeBase::from_json(SAMPLE_KB).expect("sample knowledge base is valid")
}

#[must_use]
pub fn sample_resolver() -> QueryResolver {
    QueryResolver::new(
        Some(Arc::new(sample_kb())),
        StructuredMatcher::default(),
        DocumentModel::new("Gardening Notes", SAMPLE_DOCUMENT),
    )
}

/// Ordered log of everything the mocks did, stamped with the (paused) clock
#[derive(Clone, Default)]
pub struct Timeline {
    entries: Arc<Mutex<Vec<(String, Instant)>>>,
}

impl Timeline {
    pub fn record(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .expect("timeline lock")
            .push((entry.into(), Instant::now()));
    }

    /// Entries without timestamps
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("timeline lock")
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// When `entry` was recorded
    #[must_use]
    pub fn at(&self, entry: &str) -> Instant {
        self.entries
            .lock()
            .expect("timeline lock")
            .iter()
            .find(|(name, _)| name == entry)
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("no timeline entry {entry}"))
    }

    /// Every time `entry` was recorded
    #[must_use]
    pub fn all(&self, entry: &str) -> Vec<Instant> {
        self.entries
            .lock()
            .expect("timeline lock")
            .iter()
            .filter(|(name, _)| name == entry)
            .map(|(_, at)| *at)
            .collect()
    }

    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.names().iter().filter(|n| n.starts_with(prefix)).count()
    }
}

/// How the mock remote answers one request
#[derive(Clone, Debug)]
pub enum RemoteReply {
    Audio,
    Empty,
    Fail,
}

/// Remote synthesizer returning the request text as "audio"
pub struct MockRemote {
    pub timeline: Timeline,
    pub latency: Duration,
    replies: Mutex<VecDeque<RemoteReply>>,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<SynthesisRequest>>,
}

impl MockRemote {
    /// Answers with audio unless `replies` says otherwise
    #[must_use]
    pub fn new(timeline: Timeline, latency: Duration, replies: Vec<RemoteReply>) -> Self {
        Self {
            timeline,
            latency,
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RemoteSynthesizer for MockRemote {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedSpeech> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.timeline.record(format!("remote:{}", request.text));
        tokio::time::sleep(self.latency).await;

        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(RemoteReply::Audio);

        match reply {
            RemoteReply::Audio => Ok(SynthesizedSpeech {
                audio: request.text.clone().into_bytes(),
                enhanced_text: Some(format!("I'd say: {}", request.text)),
            }),
            RemoteReply::Empty => Ok(SynthesizedSpeech::default()),
            RemoteReply::Fail => Err(Error::Upstream {
                service: "gateway",
                status: 500,
                message: "synthesis unavailable".to_string(),
            }),
        }
    }
}

/// Audio sink "playing" for a fixed duration per clip
pub struct MockSink {
    pub timeline: Timeline,
    pub duration: Duration,
    /// Number of upcoming starts refused with `NotAllowed`
    pub refusals: AtomicUsize,
    /// Number of upcoming clips that break off halfway through
    pub breaks: AtomicUsize,
}

impl MockSink {
    #[must_use]
    pub fn new(timeline: Timeline, duration: Duration) -> Self {
        Self {
            timeline,
            duration,
            refusals: AtomicUsize::new(0),
            breaks: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn refusing(self, times: usize) -> Self {
        self.refusals.store(times, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn breaking(self, times: usize) -> Self {
        self.breaks.store(times, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl AudioSink for MockSink {
    async fn start(
        &self,
        audio: &[u8],
    ) -> std::result::Result<Box<dyn ActivePlayback>, PlaybackError> {
        let label = String::from_utf8_lossy(audio).to_string();

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            self.timeline.record(format!("refused:{label}"));
            return Err(PlaybackError::NotAllowed("autoplay blocked".to_string()));
        }

        let breaks = self
            .breaks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        self.timeline.record(format!("start:{label}"));
        Ok(Box::new(MockPlayback {
            label,
            timeline: self.timeline.clone(),
            duration: self.duration,
            breaks,
            stopped: false,
        }))
    }
}

struct MockPlayback {
    label: String,
    timeline: Timeline,
    duration: Duration,
    breaks: bool,
    stopped: bool,
}

#[async_trait]
impl ActivePlayback for MockPlayback {
    async fn finished(&mut self) -> std::result::Result<(), PlaybackError> {
        if self.breaks {
            tokio::time::sleep(self.duration / 2).await;
            self.timeline.record(format!("broken:{}", self.label));
            return Err(PlaybackError::Failed("decode error".to_string()));
        }

        tokio::time::sleep(self.duration).await;
        self.timeline.record(format!("end:{}", self.label));
        Ok(())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.timeline.record(format!("stop:{}", self.label));
        }
    }
}

/// Local engine "speaking" for a fixed duration
pub struct MockLocal {
    pub timeline: Timeline,
    pub duration: Duration,
    pub fail: bool,
}

impl MockLocal {
    #[must_use]
    pub const fn new(timeline: Timeline, duration: Duration) -> Self {
        Self {
            timeline,
            duration,
            fail: false,
        }
    }
}

#[async_trait]
impl LocalSpeechEngine for MockLocal {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        if self.fail {
            self.timeline.record(format!("local-failed:{}", utterance.text));
            return Err(Error::Speech("no speech engine".to_string()));
        }

        let voice = utterance.voice.as_ref().map_or("none", |v| v.id.as_str());
        self.timeline
            .record(format!("local-start:{}@{voice}", utterance.text));
        tokio::time::sleep(self.duration).await;
        self.timeline.record(format!("local-end:{}", utterance.text));
        Ok(())
    }

    fn cancel(&self) {}

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(vec![
            Voice {
                id: "de".to_string(),
                name: "German".to_string(),
                lang: "de-DE".to_string(),
            },
            Voice {
                id: "en-us".to_string(),
                name: "English (America)".to_string(),
                lang: "en-US".to_string(),
            },
        ])
    }
}
