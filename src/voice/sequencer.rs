//! Voice response sequencer
//!
//! Serializes speech for answers: remote synthesis with a single local
//! fallback, at most one audible stream, and FIFO queueing of requests that
//! arrive while one is in flight.
//!
//! ```text
//! idle -> requesting -> playing -> idle -> (drain next)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::audio::{ActivePlayback, AudioSink, PlaybackError};
use super::local::{LocalSpeechEngine, Utterance, Voice, select_default_voice};
use super::remote::{RemoteSynthesizer, SynthesisRequest};
use crate::{Error, Result};

/// Delay before retrying audio the platform refused to start
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Observable sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Requesting,
    Playing,
}

/// Pending speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakRequest {
    pub text: String,
    /// Query that produced the answer
    pub context: Option<String>,
}

/// Work taken by the sequencer task, in arrival order
#[derive(Debug)]
enum Job {
    Speak(SpeakRequest),
    /// Play the audio held back after a refused start
    PlayHeld,
}

/// User-visible notices emitted while speaking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    /// Text to display for the answer being spoken
    Answer { text: String },
    /// Remote synthesis failed; the answer is spoken locally
    Degraded { text: String, reason: String },
    /// Audio could not start on its own; the user must trigger it
    ///
    /// The audio is also held by the sequencer until
    /// [`SequencerHandle::play_held`] or the next refusal replaces it.
    ManualPlayRequired { text: String, audio: Vec<u8> },
    /// Audio broke off mid-playback; it is not repeated
    PlaybackFailed { text: String, reason: String },
    /// Neither remote nor local speech worked
    SpeechFailed { text: String, reason: String },
}

/// Sequencer settings
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Voice requested from the remote synthesizer
    pub voice_id: String,
    /// Delay before the single playback-permission retry
    pub retry_delay: Duration,
}

impl SequencerConfig {
    #[must_use]
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Audio waiting for the user to start it
struct HeldAudio {
    text: String,
    audio: Vec<u8>,
}

/// Mutable playback state owned by the sequencer task
#[derive(Default)]
struct VoiceSession {
    current_audio: Option<Box<dyn ActivePlayback>>,
    held: Option<HeldAudio>,
    selected_voice: Option<Voice>,
    voices_loaded: bool,
}

/// Builds and runs the sequencer task
pub struct Sequencer {
    config: SequencerConfig,
    remote: Option<Arc<dyn RemoteSynthesizer>>,
    local: Arc<dyn LocalSpeechEngine>,
    sink: Arc<dyn AudioSink>,
    session: VoiceSession,
    state: watch::Sender<PlaybackState>,
    events: mpsc::UnboundedSender<SequencerEvent>,
}

impl Sequencer {
    /// Spawn a sequencer task
    ///
    /// Without a remote synthesizer every answer is spoken locally. Returns
    /// the handle used to queue speech and the stream of user-visible events.
    #[must_use]
    pub fn spawn(
        config: SequencerConfig,
        remote: Option<Arc<dyn RemoteSynthesizer>>,
        local: Arc<dyn LocalSpeechEngine>,
        sink: Arc<dyn AudioSink>,
    ) -> (SequencerHandle, mpsc::UnboundedReceiver<SequencerEvent>) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PlaybackState::Idle);

        if remote.is_none() {
            tracing::info!("remote synthesis disabled, speaking locally only");
        }

        let sequencer = Self {
            config,
            remote,
            local,
            sink,
            session: VoiceSession::default(),
            state: state_tx,
            events: events_tx,
        };

        let task = tokio::spawn(sequencer.run(requests_rx));

        (
            SequencerHandle {
                requests: requests_tx,
                state: state_rx,
                task,
            },
            events_rx,
        )
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Job>) {
        let mut queue: VecDeque<Job> = VecDeque::new();
        let mut open = true;

        loop {
            let job = match queue.pop_front() {
                Some(job) => job,
                None if open => match requests.recv().await {
                    Some(job) => job,
                    None => break,
                },
                None => break,
            };

            let delivery = self.deliver(job);
            tokio::pin!(delivery);

            // requests arriving mid-delivery wait their turn
            loop {
                tokio::select! {
                    biased;
                    () = &mut delivery => break,
                    incoming = requests.recv(), if open => match incoming {
                        Some(job) => {
                            queue.push_back(job);
                            tracing::debug!(queued = queue.len(), "speech request queued");
                        }
                        None => open = false,
                    },
                }
            }
        }

        tracing::debug!("sequencer stopped");
    }

    /// Run one job start to finish, ending in `Idle`
    async fn deliver(&mut self, job: Job) {
        self.begin_request();

        match (job, self.remote.clone()) {
            (Job::Speak(request), Some(remote)) => {
                self.speak_remote(remote.as_ref(), request).await;
            }
            (Job::Speak(request), None) => {
                self.emit(SequencerEvent::Answer {
                    text: request.text.clone(),
                });
                self.speak_locally(&request.text).await;
            }
            (Job::PlayHeld, _) => self.play_held().await,
        }

        self.session.current_audio = None;
        self.set_state(PlaybackState::Idle);
    }

    /// Silence anything still audible before a new request
    fn begin_request(&mut self) {
        self.local.cancel();
        if let Some(mut audio) = self.session.current_audio.take() {
            audio.stop();
        }
        self.set_state(PlaybackState::Requesting);
    }

    async fn speak_remote(&mut self, remote: &dyn RemoteSynthesizer, request: SpeakRequest) {
        let synthesis = SynthesisRequest {
            text: request.text.clone(),
            voice_id: self.config.voice_id.clone(),
            context: request.context,
        };

        let speech = match remote.synthesize(&synthesis).await {
            Ok(speech) if speech.audio.is_empty() => {
                return self.fall_back(&request.text, "empty audio payload").await;
            }
            Ok(speech) => speech,
            Err(e) => return self.fall_back(&request.text, &e.to_string()).await,
        };

        self.emit(SequencerEvent::Answer {
            text: speech
                .enhanced_text
                .unwrap_or_else(|| request.text.clone()),
        });

        let started =
            start_with_retry(self.sink.as_ref(), &speech.audio, self.config.retry_delay).await;

        let playback = match started {
            Ok(playback) => playback,
            Err(PlaybackError::NotAllowed(reason)) => {
                tracing::warn!(%reason, "audio still blocked after retry, manual play required");
                self.hold(request.text, speech.audio);
                return;
            }
            Err(PlaybackError::Failed(reason)) => {
                return self.fall_back(&request.text, &reason).await;
            }
        };

        self.play(&request.text, playback).await;
    }

    /// Wait for started audio to end
    ///
    /// An error partway through ends the request; part of the answer was
    /// already heard, so it is not spoken again.
    async fn play(&mut self, text: &str, playback: Box<dyn ActivePlayback>) {
        self.set_state(PlaybackState::Playing);
        let audio = self.session.current_audio.insert(playback);
        let outcome = audio.finished().await;

        if let Err(e) = outcome {
            tracing::warn!(error = %e, "audio playback broke off");
            self.emit(SequencerEvent::PlaybackFailed {
                text: text.to_string(),
                reason: e.to_string(),
            });
        }
    }

    /// Keep refused audio for a user-triggered start
    fn hold(&mut self, text: String, audio: Vec<u8>) {
        self.emit(SequencerEvent::ManualPlayRequired {
            text: text.clone(),
            audio: audio.clone(),
        });
        self.session.held = Some(HeldAudio { text, audio });
    }

    async fn play_held(&mut self) {
        let Some(held) = self.session.held.take() else {
            tracing::debug!("no held audio to play");
            return;
        };

        let started = self.sink.start(&held.audio).await;
        match started {
            Ok(playback) => self.play(&held.text, playback).await,
            Err(PlaybackError::NotAllowed(reason)) => {
                tracing::warn!(%reason, "held audio refused again");
                self.hold(held.text, held.audio);
            }
            Err(PlaybackError::Failed(reason)) => {
                tracing::warn!(%reason, "held audio failed to start");
                self.emit(SequencerEvent::PlaybackFailed {
                    text: held.text,
                    reason,
                });
            }
        }
    }

    /// The single local attempt after a remote failure
    async fn fall_back(&mut self, text: &str, reason: &str) {
        tracing::warn!(%reason, "remote speech failed, falling back to local synthesis");
        self.emit(SequencerEvent::Degraded {
            text: text.to_string(),
            reason: reason.to_string(),
        });
        self.speak_locally(text).await;
    }

    async fn speak_locally(&mut self, text: &str) {
        let voice = self.default_voice().await;
        let utterance = Utterance::new(text, voice);

        self.set_state(PlaybackState::Playing);

        if let Err(e) = self.local.speak(&utterance).await {
            tracing::error!(error = %e, "local speech failed");
            self.emit(SequencerEvent::SpeechFailed {
                text: text.to_string(),
                reason: e.to_string(),
            });
        }
    }

    /// Cached default local voice, looked up on first use
    async fn default_voice(&mut self) -> Option<Voice> {
        if !self.session.voices_loaded {
            self.session.voices_loaded = true;
            match self.local.list_voices().await {
                Ok(voices) => {
                    self.session.selected_voice = select_default_voice(&voices).cloned();
                    tracing::debug!(
                        available = voices.len(),
                        voice = ?self.session.selected_voice.as_ref().map(|v| &v.name),
                        "selected local voice"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "could not list local voices"),
            }
        }

        self.session.selected_voice.clone()
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: SequencerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("no listener for sequencer events");
        }
    }
}

/// Start audio, retrying once if the platform refuses
async fn start_with_retry(
    sink: &dyn AudioSink,
    audio: &[u8],
    retry_delay: Duration,
) -> std::result::Result<Box<dyn ActivePlayback>, PlaybackError> {
    match sink.start(audio).await {
        Err(PlaybackError::NotAllowed(reason)) => {
            tracing::warn!(
                %reason,
                delay_ms = retry_delay.as_millis(),
                "audio playback refused, retrying once"
            );
            tokio::time::sleep(retry_delay).await;
            sink.start(audio).await
        }
        result => result,
    }
}

/// Handle for queueing speech
pub struct SequencerHandle {
    requests: mpsc::UnboundedSender<Job>,
    state: watch::Receiver<PlaybackState>,
    task: JoinHandle<()>,
}

impl SequencerHandle {
    /// Queue text for speaking, returning immediately
    ///
    /// # Errors
    ///
    /// Returns error if the sequencer task has stopped
    pub fn speak(&self, text: impl Into<String>, context: Option<String>) -> Result<()> {
        self.send(Job::Speak(SpeakRequest {
            text: text.into(),
            context,
        }))
    }

    /// Play the audio held after [`SequencerEvent::ManualPlayRequired`]
    ///
    /// Queued behind anything already requested so only one stream is
    /// audible. Does nothing when no audio is held.
    ///
    /// # Errors
    ///
    /// Returns error if the sequencer task has stopped
    pub fn play_held(&self) -> Result<()> {
        self.send(Job::PlayHeld)
    }

    fn send(&self, job: Job) -> Result<()> {
        self.requests
            .send(job)
            .map_err(|_| Error::Playback("sequencer stopped".to_string()))
    }

    /// Current playback state
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Watch playback state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Stop accepting requests and wait for the queue to drain
    ///
    /// # Errors
    ///
    /// Returns error if the sequencer task panicked
    pub async fn finish(self) -> Result<()> {
        drop(self.requests);
        self.task
            .await
            .map_err(|e| Error::Playback(format!("sequencer task failed: {e}")))
    }
}
