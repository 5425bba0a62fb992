//! Voice output
//!
//! The sequencer and its collaborators (remote synthesizer, local speech
//! engine, audio sink) run on the client. The TTS client, enhancer and proxy
//! run inside the gateway server.

mod audio;
mod enhance;
mod local;
mod proxy;
mod remote;
mod sequencer;
mod tts;

pub use audio::{ActivePlayback, AudioSink, CommandAudioSink, PlaybackError};
pub use enhance::{DEFAULT_LLM_MODEL, Enhancer, OPENAI_API_URL};
pub use local::{
    CommandSpeechEngine, DEFAULT_LANG, LocalSpeechEngine, Utterance, Voice, select_default_voice,
};
pub use proxy::{
    DEFAULT_MAX_CHARS, DEFAULT_QUEUE_DELAY, ProxyConfig, ProxyError, ProxyReply, ProxyRequest,
    SpeechProxy,
};
pub use remote::{RemoteSynthesizer, SynthesisRequest, SynthesizedSpeech};
pub use sequencer::{
    DEFAULT_RETRY_DELAY, PlaybackState, SequencerConfig, SequencerEvent, SequencerHandle,
    SpeakRequest, Sequencer,
};
pub use tts::{DEFAULT_TTS_MODEL, ELEVENLABS_API_URL, TextToSpeech, VoiceSettings};
